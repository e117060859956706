// Resona
// Copyright (c) 2024-2026 The Resona Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::audio::ContainerInfo;
use crate::codecs::{AudioCodec, AudioTrackDecoder};
use crate::errors::{unsupported_format_error, Result};
use crate::io::{LocalFile, RandomAccessFile};

/// Sentinel for "no codec recorded" in the most-recently-used slots.
const NONE: usize = usize::MAX;

/// Routes files to the registered codec that recognizes them.
///
/// Codecs are tried in an optimized order: first the codec registered for the caller's
/// file extension hint, then the codec that most recently succeeded, then the one
/// before that, then everything else in registration order. The first codec that
/// recognizes the file wins.
///
/// Registration must be complete before dispatch begins; after that, any number of
/// threads may probe and open files concurrently. The most-recently-used slots are
/// plain atomics updated without further synchronization: a data race between two
/// successful probes can leave them slightly stale, which only costs a misprediction
/// on the next probe, never a wrong answer.
pub struct AudioLoader {
    codecs: Vec<Box<dyn AudioCodec>>,
    codec_index_by_extension: HashMap<String, usize>,
    most_recent: AtomicUsize,
    second_most_recent: AtomicUsize,
}

impl Default for AudioLoader {
    fn default() -> AudioLoader {
        AudioLoader::new()
    }
}

impl AudioLoader {
    /// Creates a loader with no codecs registered.
    pub fn new() -> AudioLoader {
        AudioLoader {
            codecs: Vec::new(),
            codec_index_by_extension: HashMap::new(),
            most_recent: AtomicUsize::new(NONE),
            second_most_recent: AtomicUsize::new(NONE),
        }
    }

    /// Registers a codec. For every file extension the codec claims, the earliest
    /// registered codec stays the one mapped to that extension.
    pub fn register(&mut self, codec: Box<dyn AudioCodec>) {
        let index = self.codecs.len();
        for extension in codec.file_extensions() {
            self.codec_index_by_extension.entry(normalize_extension(extension)).or_insert(index);
        }
        self.codecs.push(codec);
    }

    /// Number of registered codecs.
    pub fn codec_count(&self) -> usize {
        self.codecs.len()
    }

    /// Inspects a file and describes its contents if any registered codec recognizes
    /// it. Returns `Ok(None)` when no codec does.
    pub fn try_read_info(
        &self,
        file: &Arc<dyn RandomAccessFile>,
        extension_hint: Option<&str>,
    ) -> Result<Option<ContainerInfo>> {
        for index in self.dispatch_order(extension_hint) {
            let codec = &self.codecs[index];
            if let Some(info) = codec.try_read_info(file, extension_hint)? {
                self.record_success(index);
                return Ok(Some(info));
            }
            debug!("codec '{}' declined the file", codec.name());
        }

        Ok(None)
    }

    /// Opens a file from a path and describes its contents. The path's extension is
    /// used as the dispatch hint.
    pub fn try_read_info_from_path<P: AsRef<Path>>(&self, path: P) -> Result<Option<ContainerInfo>> {
        let path = path.as_ref();
        let file: Arc<dyn RandomAccessFile> = Arc::new(LocalFile::open(path)?);
        self.try_read_info(&file, extension_of(path).as_deref())
    }

    /// Opens a decoder for one track of the file.
    ///
    /// Unlike [`AudioLoader::try_read_info`], the caller has committed to decoding
    /// here, so an unrecognized file is an unsupported-format error rather than an
    /// empty result.
    pub fn open_decoder(
        &self,
        file: Arc<dyn RandomAccessFile>,
        extension_hint: Option<&str>,
        track_index: usize,
    ) -> Result<Box<dyn AudioTrackDecoder>> {
        for index in self.dispatch_order(extension_hint) {
            let codec = &self.codecs[index];
            if let Some(decoder) =
                codec.try_open_decoder(Arc::clone(&file), extension_hint, track_index)?
            {
                self.record_success(index);
                return Ok(decoder);
            }
            debug!("codec '{}' declined the file", codec.name());
        }

        unsupported_format_error("no registered codec recognizes this file")
    }

    /// Opens a decoder for one track of a file on the file system. The path's
    /// extension is used as the dispatch hint.
    pub fn open_decoder_from_path<P: AsRef<Path>>(
        &self,
        path: P,
        track_index: usize,
    ) -> Result<Box<dyn AudioTrackDecoder>> {
        let path = path.as_ref();
        let file: Arc<dyn RandomAccessFile> = Arc::new(LocalFile::open(path)?);
        self.open_decoder(file, extension_of(path).as_deref(), track_index)
    }

    /// Produces the codec indices to try, most promising first, without duplicates.
    fn dispatch_order(&self, extension_hint: Option<&str>) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.codecs.len());

        if let Some(hint) = extension_hint {
            if let Some(&index) = self.codec_index_by_extension.get(&normalize_extension(hint)) {
                order.push(index);
            }
        }

        let most_recent = self.most_recent.load(Ordering::Relaxed);
        if most_recent != NONE && most_recent < self.codecs.len() && !order.contains(&most_recent) {
            order.push(most_recent);
        }

        let second = self.second_most_recent.load(Ordering::Relaxed);
        if second != NONE && second < self.codecs.len() && !order.contains(&second) {
            order.push(second);
        }

        for index in 0..self.codecs.len() {
            if !order.contains(&index) {
                order.push(index);
            }
        }

        order
    }

    /// Remembers the codec that just recognized a file for future dispatch ordering.
    fn record_success(&self, index: usize) {
        let previous = self.most_recent.swap(index, Ordering::Relaxed);
        if previous != index && previous != NONE {
            self.second_most_recent.store(previous, Ordering::Relaxed);
        }
    }
}

/// Lowercases an extension and strips the optional leading dot.
fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

/// The extension of a path, if it has one.
fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TrackInfo;
    use crate::io::MemoryFile;
    use std::sync::Mutex;

    /// A scripted codec that recognizes files starting with a marker byte and logs
    /// every probe it receives.
    struct ScriptedCodec {
        name: &'static str,
        extensions: Vec<&'static str>,
        marker: u8,
        probes: Arc<Mutex<Vec<&'static str>>>,
    }

    impl AudioCodec for ScriptedCodec {
        fn name(&self) -> &str {
            self.name
        }

        fn file_extensions(&self) -> &[&str] {
            &self.extensions
        }

        fn try_read_info(
            &self,
            file: &Arc<dyn RandomAccessFile>,
            _extension_hint: Option<&str>,
        ) -> Result<Option<ContainerInfo>> {
            self.probes.lock().unwrap().push(self.name);

            let mut marker = [0u8; 1];
            file.read_at(0, &mut marker)?;
            if marker[0] == self.marker {
                Ok(Some(ContainerInfo::single_track(TrackInfo::default())))
            } else {
                Ok(None)
            }
        }

        fn try_open_decoder(
            &self,
            file: Arc<dyn RandomAccessFile>,
            extension_hint: Option<&str>,
            _track_index: usize,
        ) -> Result<Option<Box<dyn AudioTrackDecoder>>> {
            // The scripted codec never opens decoders; the probe log is what the
            // tests inspect.
            self.try_read_info(&file, extension_hint).map(|_| None)
        }
    }

    fn loader_with_two_ogg_codecs() -> (AudioLoader, Arc<Mutex<Vec<&'static str>>>) {
        let probes = Arc::new(Mutex::new(Vec::new()));
        let mut loader = AudioLoader::new();
        loader.register(Box::new(ScriptedCodec {
            name: "A",
            extensions: vec!["ogg"],
            marker: b'A',
            probes: Arc::clone(&probes),
        }));
        loader.register(Box::new(ScriptedCodec {
            name: "B",
            extensions: vec!["ogg"],
            marker: b'B',
            probes: Arc::clone(&probes),
        }));
        loader.register(Box::new(ScriptedCodec {
            name: "C",
            extensions: vec!["wav"],
            marker: b'C',
            probes: Arc::clone(&probes),
        }));
        (loader, probes)
    }

    fn file_of(marker: u8) -> Arc<dyn RandomAccessFile> {
        Arc::new(MemoryFile::from_vec(vec![marker; 4]))
    }

    #[test]
    fn extension_hint_is_tried_first_and_first_registration_wins() {
        let (loader, probes) = loader_with_two_ogg_codecs();

        // Both A and B claim ".ogg"; A registered first, so the hint maps to A. The
        // file is only recognized by B, which must still be reached afterwards.
        let info = loader.try_read_info(&file_of(b'B'), Some(".ogg")).unwrap();
        assert!(info.is_some());
        assert_eq!(*probes.lock().unwrap(), vec!["A", "B"]);

        // B's success makes it the most recently used codec: a hint-less probe now
        // asks B before anything else.
        probes.lock().unwrap().clear();
        let info = loader.try_read_info(&file_of(b'B'), None).unwrap();
        assert!(info.is_some());
        assert_eq!(probes.lock().unwrap().first(), Some(&"B"));
    }

    #[test]
    fn extension_hints_are_case_insensitive_and_tolerate_the_dot() {
        let (loader, probes) = loader_with_two_ogg_codecs();

        for hint in [".OGG", "Ogg", "ogg", ".ogg"] {
            probes.lock().unwrap().clear();
            let _ = loader.try_read_info(&file_of(b'A'), Some(hint)).unwrap();
            assert_eq!(probes.lock().unwrap().first(), Some(&"A"), "hint {}", hint);
        }
    }

    #[test]
    fn most_recent_codecs_are_preferred_in_order() {
        let (loader, probes) = loader_with_two_ogg_codecs();

        // C succeeds, then B succeeds: the MRU order is now [B, C].
        loader.try_read_info(&file_of(b'C'), None).unwrap();
        loader.try_read_info(&file_of(b'B'), None).unwrap();

        probes.lock().unwrap().clear();
        let _ = loader.try_read_info(&file_of(b'X'), None).unwrap();
        assert_eq!(*probes.lock().unwrap(), vec!["B", "C", "A"]);
    }

    #[test]
    fn unrecognized_files_yield_empty_info_but_decoder_errors() {
        let (loader, _probes) = loader_with_two_ogg_codecs();

        assert!(loader.try_read_info(&file_of(b'X'), None).unwrap().is_none());
        assert!(matches!(
            loader.open_decoder(file_of(b'X'), None, 0),
            Err(crate::errors::Error::UnsupportedFormat(_))
        ));
    }
}
