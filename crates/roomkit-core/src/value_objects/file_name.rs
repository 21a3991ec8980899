//! Unique storage object names
//!
//! `photo.png` becomes `photo_<id>.png` where `<id>` is a short random
//! alphanumeric string not among the ids this generator handed out most
//! recently. Only a bounded window of ids is remembered, so a long-lived
//! generator does not grow without limit.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use rand::Rng;

/// Length of the random id inserted before the extension
pub const FILE_ID_LEN: usize = 6;

/// How many recent ids are checked for collisions by default
pub const DEFAULT_ID_WINDOW: usize = 65_536;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Split `name` into stem and extension at the last dot.
///
/// Leading dots (hidden files) and trailing dots do not count as an extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Generates collision-free object names for uploads
#[derive(Debug)]
pub struct FileNameGenerator {
    issued: Mutex<IssuedIds>,
}

#[derive(Debug)]
struct IssuedIds {
    seen: HashSet<String>,
    order: VecDeque<String>,
    window: usize,
}

impl IssuedIds {
    /// Remember `id` unless it is already in the window
    fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for FileNameGenerator {
    fn default() -> Self {
        Self::with_window(DEFAULT_ID_WINDOW)
    }
}

impl FileNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the last `window` ids (at least one)
    pub fn with_window(window: usize) -> Self {
        Self {
            issued: Mutex::new(IssuedIds {
                seen: HashSet::new(),
                order: VecDeque::new(),
                window: window.max(1),
            }),
        }
    }

    /// Derive a unique name from the original file name
    pub fn generate(&self, original: &str) -> String {
        let id = self.next_id();
        match split_extension(original) {
            (stem, Some(ext)) => format!("{stem}_{id}.{ext}"),
            (stem, None) => format!("{stem}_{id}"),
        }
    }

    /// Number of ids currently remembered, never more than the window
    pub fn issued_count(&self) -> usize {
        self.issued.lock().order.len()
    }

    fn next_id(&self) -> String {
        let mut issued = self.issued.lock();
        let mut rng = rand::thread_rng();
        loop {
            let id: String = (0..FILE_ID_LEN)
                .map(|_| {
                    let idx = rng.gen_range(0..CHARSET.len());
                    CHARSET[idx] as char
                })
                .collect();
            if issued.insert(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("photo.png"), ("photo", Some("png")));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(split_extension(".env"), (".env", None));
        assert_eq!(split_extension("trailing."), ("trailing.", None));
    }

    #[test]
    fn test_generate_keeps_extension() {
        let generator = FileNameGenerator::new();
        let name = generator.generate("photo.png");

        assert!(name.starts_with("photo_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "photo_".len() + FILE_ID_LEN + ".png".len());

        let id = &name["photo_".len().."photo_".len() + FILE_ID_LEN];
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_without_extension() {
        let generator = FileNameGenerator::new();
        let name = generator.generate("notes");

        assert!(name.starts_with("notes_"));
        assert!(!name.contains('.'));
        assert_eq!(name.len(), "notes_".len() + FILE_ID_LEN);
    }

    #[test]
    fn test_no_collisions() {
        let generator = FileNameGenerator::new();
        let names: HashSet<String> = (0..10_000).map(|_| generator.generate("a.txt")).collect();

        assert_eq!(names.len(), 10_000);
        assert_eq!(generator.issued_count(), 10_000);
    }

    #[test]
    fn test_memory_is_bounded_by_window() {
        let generator = FileNameGenerator::with_window(8);
        for _ in 0..100 {
            generator.generate("a.txt");
        }
        assert_eq!(generator.issued_count(), 8);
    }

    #[test]
    fn test_window_rejects_recent_ids_only() {
        let mut issued = IssuedIds {
            seen: HashSet::new(),
            order: VecDeque::new(),
            window: 2,
        };
        assert!(issued.insert("aaaaaa"));
        assert!(!issued.insert("aaaaaa"));
        assert!(issued.insert("bbbbbb"));
        assert!(issued.insert("cccccc"));

        // Evicted from the window, so usable again
        assert!(issued.insert("aaaaaa"));
        assert!(!issued.insert("cccccc"));
    }
}
