// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::errors::{Error, Result};

bitflags! {
    /// A bitmask of positional audio channels.
    ///
    /// The bit values are identical to the channel mask of Microsoft's
    /// `WAVEFORMATEXTENSIBLE` structure, so a mask can be written into Waveform and
    /// WavPack files verbatim. An empty mask means the placement is unknown or was
    /// never specified.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChannelPlacement: u32 {
        /// Front-left corner speaker, or the left speaker of a stereo pair.
        const FRONT_LEFT           = 0x1;
        /// Front-right corner speaker, or the right speaker of a stereo pair.
        const FRONT_RIGHT          = 0x2;
        /// Directly in front of the listener. Also the mono channel.
        const FRONT_CENTER         = 0x4;
        /// Bass / subwoofer channel without a perceivable direction.
        const LOW_FREQUENCY_EFFECTS = 0x8;
        const BACK_LEFT            = 0x10;
        const BACK_RIGHT           = 0x20;
        const FRONT_CENTER_LEFT    = 0x40;
        const FRONT_CENTER_RIGHT   = 0x80;
        const BACK_CENTER          = 0x100;
        const SIDE_LEFT            = 0x200;
        const SIDE_RIGHT           = 0x400;
        const TOP_CENTER           = 0x800;
        const TOP_FRONT_LEFT       = 0x1000;
        const TOP_FRONT_CENTER     = 0x2000;
        const TOP_FRONT_RIGHT      = 0x4000;
        const TOP_BACK_LEFT        = 0x8000;
        const TOP_BACK_CENTER      = 0x10000;
        const TOP_BACK_RIGHT       = 0x20000;

        /// Plain two-speaker stereo.
        const STEREO = Self::FRONT_LEFT.bits() | Self::FRONT_RIGHT.bits();
        /// The standard 5.1 surround layout.
        const FIVE_POINT_ONE = Self::FRONT_LEFT.bits()
            | Self::FRONT_RIGHT.bits()
            | Self::FRONT_CENTER.bits()
            | Self::LOW_FREQUENCY_EFFECTS.bits()
            | Self::BACK_LEFT.bits()
            | Self::BACK_RIGHT.bits();
        /// The standard 7.1 surround layout.
        const SEVEN_POINT_ONE = Self::FIVE_POINT_ONE.bits()
            | Self::SIDE_LEFT.bits()
            | Self::SIDE_RIGHT.bits();
    }
}

/// Number of distinct speaker positions in the mask.
const PLACEMENT_BIT_COUNT: usize = 18;

/// Display names of the placements, ordered by bit index.
const PLACEMENT_NAMES: [&str; PLACEMENT_BIT_COUNT] = [
    "front left",
    "front right",
    "front center",
    "low frequency effects",
    "back left",
    "back right",
    "front center left",
    "front center right",
    "back center",
    "side left",
    "side right",
    "top center",
    "top front left",
    "top front center",
    "top front right",
    "top back left",
    "top back center",
    "top back right",
];

impl ChannelPlacement {
    /// The placement of the channel stored at `bit_index` in mask ordering.
    fn from_bit_index(bit_index: usize) -> ChannelPlacement {
        ChannelPlacement::from_bits_truncate(1 << bit_index)
    }

    /// Number of placements present in the mask.
    pub fn count(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

/// Produces the ordered channel layout implied by a channel mask.
///
/// The channel order is derived from the bit order of the mask, lowest bit first; this
/// is the ordering used by the Waveform and WavPack containers. If the stream carries
/// more channels than the mask has bits set, the surplus channels have no known
/// placement and are emitted as empty (unknown) entries.
pub fn layout_from_mask(channel_count: usize, mask: ChannelPlacement) -> Vec<ChannelPlacement> {
    let mut layout = Vec::with_capacity(channel_count);

    for bit_index in 0..PLACEMENT_BIT_COUNT {
        if layout.len() == channel_count {
            break;
        }
        let placement = ChannelPlacement::from_bit_index(bit_index);
        if mask.contains(placement) {
            layout.push(placement);
        }
    }

    layout.resize(channel_count, ChannelPlacement::empty());
    layout
}

/// Produces the fixed channel layout the Vorbis I specification prescribes for
/// a given channel count. Opus (through its Vorbis-inherited mapping family 1)
/// uses the same orderings.
///
/// Streams with more than eight channels have application-defined meaning, so all
/// their placements are unknown.
pub fn vorbis_layout(channel_count: usize) -> Vec<ChannelPlacement> {
    use self::ChannelPlacement as P;

    match channel_count {
        1 => vec![P::FRONT_CENTER],
        2 => vec![P::FRONT_LEFT, P::FRONT_RIGHT],
        3 => vec![P::FRONT_LEFT, P::FRONT_CENTER, P::FRONT_RIGHT],
        4 => vec![P::FRONT_LEFT, P::FRONT_RIGHT, P::BACK_LEFT, P::BACK_RIGHT],
        5 => vec![P::FRONT_LEFT, P::FRONT_CENTER, P::FRONT_RIGHT, P::BACK_LEFT, P::BACK_RIGHT],
        6 => vec![
            P::FRONT_LEFT,
            P::FRONT_CENTER,
            P::FRONT_RIGHT,
            P::BACK_LEFT,
            P::BACK_RIGHT,
            P::LOW_FREQUENCY_EFFECTS,
        ],
        7 => vec![
            P::FRONT_LEFT,
            P::FRONT_CENTER,
            P::FRONT_RIGHT,
            P::SIDE_LEFT,
            P::SIDE_RIGHT,
            P::BACK_CENTER,
            P::LOW_FREQUENCY_EFFECTS,
        ],
        8 => vec![
            P::FRONT_LEFT,
            P::FRONT_CENTER,
            P::FRONT_RIGHT,
            P::SIDE_LEFT,
            P::SIDE_RIGHT,
            P::BACK_LEFT,
            P::BACK_RIGHT,
            P::LOW_FREQUENCY_EFFECTS,
        ],
        other => vec![ChannelPlacement::empty(); other],
    }
}

impl fmt::Display for ChannelPlacement {
    /// Formats the mask as a comma-separated list of lowercase placement names, or
    /// "none" for the empty mask.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (bit_index, name) in PLACEMENT_NAMES.iter().enumerate() {
            if self.contains(ChannelPlacement::from_bit_index(bit_index)) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// The direction words recognized while parsing a placement description.
#[derive(Default)]
struct PlacementWords {
    none: bool,
    left: bool,
    right: bool,
    center: bool,
    front: bool,
    back: bool,
    top: bool,
    bottom: bool,
    bass: bool,
    lfe: bool,
    low: bool,
    frequency: bool,
    effects: bool,
}

impl PlacementWords {
    fn collect(text: &str) -> PlacementWords {
        let mut words = PlacementWords::default();

        // Words the vocabulary doesn't know are skipped without complaint so that
        // decorated names ("upper top front left speaker") keep parsing.
        for word in text.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
            words.none |= word.eq_ignore_ascii_case("none");
            words.left |= word.eq_ignore_ascii_case("left");
            words.right |= word.eq_ignore_ascii_case("right");
            words.center |= word.eq_ignore_ascii_case("center");
            words.front |= word.eq_ignore_ascii_case("front");
            words.back |= word.eq_ignore_ascii_case("back");
            words.back |= word.eq_ignore_ascii_case("rear");
            words.top |= word.eq_ignore_ascii_case("top");
            words.bottom |= word.eq_ignore_ascii_case("bottom");
            words.bass |= word.eq_ignore_ascii_case("bass");
            words.lfe |= word.eq_ignore_ascii_case("lfe");
            words.low |= word.eq_ignore_ascii_case("low");
            words.frequency |= word.eq_ignore_ascii_case("frequency");
            words.effects |= word.eq_ignore_ascii_case("effects");
        }

        words
    }

    fn is_directional(&self) -> bool {
        self.left || self.center || self.right || self.front || self.back || self.bottom || self.top
    }

    fn is_low_frequency(&self) -> bool {
        self.bass || self.lfe || self.low || self.frequency || self.effects
    }
}

/// Parses the description of a single channel placement.
fn identify_placement(text: &str) -> Result<ChannelPlacement> {
    use self::ChannelPlacement as P;

    let words = PlacementWords::collect(text);

    // Contradictory combinations: opposing directions, a low-frequency word next to
    // a directional one, or "none" next to anything else.
    let contradictory = (words.left && words.right)
        || (words.front && words.back)
        || (words.bottom && words.top)
        || (words.is_directional() && words.is_low_frequency())
        || (words.none && (words.is_directional() || words.is_low_frequency()));

    if !contradictory {
        if words.none {
            return Ok(P::empty());
        } else if words.top {
            if words.front {
                return Ok(if words.left {
                    P::TOP_FRONT_LEFT
                } else if words.right {
                    P::TOP_FRONT_RIGHT
                } else {
                    P::TOP_FRONT_CENTER
                });
            } else if words.back {
                return Ok(if words.left {
                    P::TOP_BACK_LEFT
                } else if words.right {
                    P::TOP_BACK_RIGHT
                } else {
                    P::TOP_BACK_CENTER
                });
            } else if !words.left && !words.right {
                return Ok(P::TOP_CENTER);
            }
        } else if words.bottom {
            // There are no bottom placements, but the word is reserved; fall through
            // to the invalid-combination error.
        } else if !words.is_low_frequency() {
            if words.front {
                if words.left {
                    return Ok(if words.center { P::FRONT_CENTER_LEFT } else { P::FRONT_LEFT });
                } else if words.right {
                    return Ok(if words.center { P::FRONT_CENTER_RIGHT } else { P::FRONT_RIGHT });
                } else {
                    return Ok(P::FRONT_CENTER);
                }
            } else if words.back {
                if words.left && !words.center {
                    return Ok(P::BACK_LEFT);
                } else if words.right && !words.center {
                    return Ok(P::BACK_RIGHT);
                } else if !words.left && !words.right {
                    return Ok(P::BACK_CENTER);
                }
            } else if words.left && !words.center {
                return Ok(P::SIDE_LEFT);
            } else if words.right && !words.center {
                return Ok(P::SIDE_RIGHT);
            }
        } else if words.bass {
            if !words.lfe && !words.low && !words.frequency && !words.effects {
                return Ok(P::LOW_FREQUENCY_EFFECTS);
            }
        } else if words.lfe {
            if !words.low && !words.frequency && !words.effects {
                return Ok(P::LOW_FREQUENCY_EFFECTS);
            }
        } else if words.low && words.frequency {
            return Ok(P::LOW_FREQUENCY_EFFECTS);
        }
    }

    Err(Error::InvalidArgument(format!("invalid channel tag combination: {}", text)))
}

impl FromStr for ChannelPlacement {
    type Err = Error;

    /// Parses a comma-separated list of channel placement descriptions into a mask.
    ///
    /// Parsing is the inverse of `Display`: `parse(format(mask)) == mask` for every
    /// mask over the enumerated placements.
    fn from_str(text: &str) -> Result<ChannelPlacement> {
        let mut result = ChannelPlacement::empty();

        let mut parts: Vec<&str> = text.split(',').collect();
        // A trailing comma (or an empty string) leaves an empty final segment that
        // carries no description; empty segments anywhere else are malformed.
        if parts.last().is_some_and(|last| last.trim().is_empty()) {
            parts.pop();
        }

        for part in parts {
            result |= identify_placement(part)?;
        }

        Ok(result)
    }
}
