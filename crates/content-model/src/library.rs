//! The content library: category trees, selection, and history.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::history::{sample_history, RecordingEntry};
use crate::node::ContentNode;

/// Folder that user recordings are filed into, per category.
pub const MY_RECORDINGS: &str = "My Recordings";

/// Category shown first.
pub const DEFAULT_CATEGORY: &str = "Audio";

/// Categories, their trees, the current category and the file selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLibrary {
    categories: BTreeMap<String, Vec<ContentNode>>,

    /// Selected file ids, in selection order.
    #[serde(default)]
    selected_files: Vec<u64>,

    #[serde(default = "default_category")]
    current_category: String,

    #[serde(default)]
    history: Vec<RecordingEntry>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl ContentLibrary {
    /// A library over `categories`. The current category is
    /// [`DEFAULT_CATEGORY`] when present, otherwise the first one.
    pub fn new(categories: BTreeMap<String, Vec<ContentNode>>) -> Self {
        let current_category = if categories.contains_key(DEFAULT_CATEGORY) {
            DEFAULT_CATEGORY.to_string()
        } else {
            categories.keys().next().cloned().unwrap_or_default()
        };
        Self {
            categories,
            selected_files: Vec::new(),
            current_category,
            history: Vec::new(),
        }
    }

    /// Parse a library from JSON and check it is consistent.
    pub fn from_json(json: &str) -> Result<Self, LibraryError> {
        let library: Self = serde_json::from_str(json)?;
        library.validate()?;
        Ok(library)
    }

    pub fn to_json(&self) -> Result<String, LibraryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a library seed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| LibraryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let library: Self = serde_json::from_str(&json).map_err(|e| LibraryError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        library.validate()?;
        Ok(library)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LibraryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LibraryError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| LibraryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check ids are unique, the current category exists, and every
    /// selected id names a file.
    pub fn validate(&self) -> Result<(), LibraryError> {
        let mut seen = std::collections::HashSet::new();
        for node in self.categories.values().flatten() {
            let mut duplicate = None;
            node.walk(&mut |n, _| {
                if !seen.insert(n.id) && duplicate.is_none() {
                    duplicate = Some(n.id);
                }
            });
            if let Some(id) = duplicate {
                return Err(LibraryError::ValidationError {
                    message: format!("duplicate content id {id}"),
                });
            }
        }

        if !self.categories.is_empty() && !self.categories.contains_key(&self.current_category) {
            return Err(LibraryError::UnknownCategory(self.current_category.clone()));
        }

        for &id in &self.selected_files {
            match self.find(id) {
                Some(node) if node.is_file() => {}
                Some(_) => return Err(LibraryError::NotAFile(id)),
                None => return Err(LibraryError::UnknownNode(id)),
            }
        }
        Ok(())
    }

    /// Category names in display order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Top-level nodes of `name`.
    pub fn category(&self, name: &str) -> Option<&[ContentNode]> {
        self.categories.get(name).map(Vec::as_slice)
    }

    pub fn current_category(&self) -> &str {
        &self.current_category
    }

    pub fn set_current_category(&mut self, name: &str) -> Result<(), LibraryError> {
        if !self.categories.contains_key(name) {
            return Err(LibraryError::UnknownCategory(name.to_string()));
        }
        self.current_category = name.to_string();
        Ok(())
    }

    pub fn selected_files(&self) -> &[u64] {
        &self.selected_files
    }

    /// Select a file, or deselect it if already selected. Returns whether
    /// the file is selected afterwards.
    pub fn toggle_file_selection(&mut self, id: u64) -> Result<bool, LibraryError> {
        match self.find(id) {
            Some(node) if node.is_file() => {}
            Some(_) => return Err(LibraryError::NotAFile(id)),
            None => return Err(LibraryError::UnknownNode(id)),
        }
        match self.selected_files.iter().position(|&s| s == id) {
            Some(index) => {
                self.selected_files.remove(index);
                Ok(false)
            }
            None => {
                self.selected_files.push(id);
                Ok(true)
            }
        }
    }

    pub fn clear_selected_files(&mut self) {
        self.selected_files.clear();
    }

    /// The selected file nodes, in selection order.
    pub fn selected_nodes(&self) -> Vec<&ContentNode> {
        self.selected_files
            .iter()
            .filter_map(|&id| self.find(id))
            .collect()
    }

    /// File `recording` under [`MY_RECORDINGS`] in `category`, creating the
    /// folder at the end of the category when it does not exist yet.
    /// Returns the folder id.
    pub fn add_recording(
        &mut self,
        category: &str,
        recording: ContentNode,
    ) -> Result<u64, LibraryError> {
        if !recording.is_file() {
            return Err(LibraryError::NotAFile(recording.id));
        }
        if self.find(recording.id).is_some() {
            return Err(LibraryError::ValidationError {
                message: format!("content id {} is already in use", recording.id),
            });
        }

        let folder_id = self.next_id();
        let nodes = self
            .categories
            .get_mut(category)
            .ok_or_else(|| LibraryError::UnknownCategory(category.to_string()))?;

        match nodes.iter_mut().find(|n| n.is_folder() && n.name == MY_RECORDINGS) {
            Some(folder) => {
                folder.children.push(recording);
                Ok(folder.id)
            }
            None => {
                // The recording's id may equal the fresh folder id.
                let folder_id = folder_id.max(recording.id + 1);
                nodes.push(ContentNode::folder(folder_id, MY_RECORDINGS, vec![recording]));
                Ok(folder_id)
            }
        }
    }

    /// Any node with `id`, in any category.
    pub fn find(&self, id: u64) -> Option<&ContentNode> {
        self.categories
            .values()
            .flatten()
            .find_map(|node| node.find(id))
    }

    /// Visit every node of `category` depth-first, with its depth.
    pub fn walk<F>(&self, category: &str, mut visit: F) -> Result<(), LibraryError>
    where
        F: FnMut(&ContentNode, usize),
    {
        let nodes = self
            .category(category)
            .ok_or_else(|| LibraryError::UnknownCategory(category.to_string()))?;
        for node in nodes {
            node.walk(&mut visit);
        }
        Ok(())
    }

    /// An id not used by any node.
    pub fn next_id(&self) -> u64 {
        self.categories
            .values()
            .flatten()
            .map(ContentNode::max_id)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn history(&self) -> &[RecordingEntry] {
        &self.history
    }

    /// Append to the recording history. Newest entries are listed first.
    pub fn record_history(&mut self, entry: RecordingEntry) {
        self.history.insert(0, entry);
    }

    /// The built-in starter library.
    pub fn seeded() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            "Audio".to_string(),
            vec![
                ContentNode::folder(
                    32,
                    "Audio Books",
                    vec![
                        seed_file(
                            334,
                            "Anne Perry-Execution Dock.mp3",
                            "A William Monk Novel",
                            "audio/execution-dock.mp3",
                            "book-cover.jpg",
                            "12Hr 51Min",
                        ),
                        seed_file(
                            335,
                            "The Silent Patient.mp3",
                            "By Alex Michaelides",
                            "audio/silent-patient.mp3",
                            "silent-patient.jpg",
                            "8Hr 43Min",
                        ),
                    ],
                ),
                ContentNode::folder(
                    33,
                    "Medical Lectures",
                    vec![seed_file(
                        336,
                        "Latest Advances in Cardiology.mp3",
                        "By Dr. Sarah Johnson",
                        "audio/cardiology-advances.mp3",
                        "cardiology.jpg",
                        "1Hr 24Min",
                    )],
                ),
            ],
        );
        categories.insert(
            "Edu".to_string(),
            vec![ContentNode::folder(
                40,
                "Medical Training",
                vec![
                    seed_file(
                        401,
                        "Patient Assessment Techniques.mp4",
                        "Best practices for initial assessment",
                        "edu/patient-assessment.mp4",
                        "assessment.jpg",
                        "45Min",
                    ),
                    seed_file(
                        402,
                        "Modern Surgical Approaches.mp4",
                        "Minimally invasive techniques",
                        "edu/surgical-approaches.mp4",
                        "surgery.jpg",
                        "1Hr 12Min",
                    ),
                ],
            )],
        );
        categories.insert(
            "Movies".to_string(),
            vec![ContentNode::folder(
                50,
                "Medical Documentaries",
                vec![seed_file(
                    501,
                    "The Pandemic Response.mp4",
                    "Global healthcare challenges",
                    "movies/pandemic-response.mp4",
                    "pandemic.jpg",
                    "1Hr 48Min",
                )],
            )],
        );
        categories.insert(
            "Relax".to_string(),
            vec![ContentNode::folder(
                60,
                "Nature Sounds",
                vec![
                    seed_file(
                        601,
                        "Ocean Waves.mp3",
                        "Calming beach ambience",
                        "relax/ocean-waves.mp3",
                        "ocean.jpg",
                        "1Hr",
                    ),
                    seed_file(
                        602,
                        "Rainfall.mp3",
                        "Gentle rain on leaves",
                        "relax/rainfall.mp3",
                        "rain.jpg",
                        "45Min",
                    ),
                ],
            )],
        );

        let mut library = Self::new(categories);
        library.history = sample_history();
        library
    }
}

impl Default for ContentLibrary {
    fn default() -> Self {
        Self::seeded()
    }
}

fn seed_file(
    id: u64,
    name: &str,
    description: &str,
    media: &str,
    thumbnail: &str,
    runtime: &str,
) -> ContentNode {
    ContentNode::file(id, name)
        .with_description(description)
        .with_href(format!("https://example.com/{media}"))
        .with_thumbnail(format!("https://example.com/thumbnails/{thumbnail}"))
        .with_runtime(runtime)
}

/// Errors from library operations.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("No content with id {0}")]
    UnknownNode(u64),

    #[error("Content {0} is a folder, not a file")]
    NotAFile(u64),

    #[error("Invalid library: {message}")]
    ValidationError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn seeded_library_defaults() {
        let library = ContentLibrary::seeded();
        assert_eq!(library.current_category(), "Audio");
        assert_eq!(
            library.category_names().collect::<Vec<_>>(),
            vec!["Audio", "Edu", "Movies", "Relax"]
        );
        assert!(library.selected_files().is_empty());
        assert_eq!(library.history().len(), 3);
        library.validate().unwrap();
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut library = ContentLibrary::seeded();
        assert!(matches!(
            library.set_current_category("Podcasts"),
            Err(LibraryError::UnknownCategory(_))
        ));
        assert_eq!(library.current_category(), "Audio");
        library.set_current_category("Relax").unwrap();
        assert_eq!(library.current_category(), "Relax");
    }

    #[test]
    fn toggle_selects_then_deselects() {
        let mut library = ContentLibrary::seeded();
        assert!(library.toggle_file_selection(335).unwrap());
        assert!(library.toggle_file_selection(601).unwrap());
        assert_eq!(library.selected_files(), &[335, 601]);
        assert!(!library.toggle_file_selection(335).unwrap());
        assert_eq!(library.selected_files(), &[601]);
        assert!(matches!(
            library.toggle_file_selection(32),
            Err(LibraryError::NotAFile(32))
        ));
        assert!(matches!(
            library.toggle_file_selection(9999),
            Err(LibraryError::UnknownNode(9999))
        ));
        library.clear_selected_files();
        assert!(library.selected_files().is_empty());
    }

    #[test]
    fn recordings_go_into_one_personal_folder() {
        let mut library = ContentLibrary::seeded();
        let first = ContentNode::file(library.next_id(), "take-1.webm").with_runtime("00:12");
        let folder = library.add_recording("Movies", first).unwrap();

        let second = ContentNode::file(library.next_id(), "take-2.webm");
        assert_eq!(library.add_recording("Movies", second).unwrap(), folder);

        let movies = library.category("Movies").unwrap();
        assert_eq!(movies.len(), 2);
        let personal = movies.last().unwrap();
        assert_eq!(personal.name, MY_RECORDINGS);
        assert_eq!(personal.id, folder);
        assert_eq!(
            personal.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["take-1.webm", "take-2.webm"]
        );
        library.validate().unwrap();
    }

    #[test]
    fn add_recording_rejects_bad_input() {
        let mut library = ContentLibrary::seeded();
        assert!(matches!(
            library.add_recording("Podcasts", ContentNode::file(9000, "x.webm")),
            Err(LibraryError::UnknownCategory(_))
        ));
        assert!(matches!(
            library.add_recording("Audio", ContentNode::folder(9001, "x", vec![])),
            Err(LibraryError::NotAFile(9001))
        ));
        assert!(matches!(
            library.add_recording("Audio", ContentNode::file(334, "dup.webm")),
            Err(LibraryError::ValidationError { .. })
        ));
    }

    #[test]
    fn walk_reports_unknown_category() {
        let library = ContentLibrary::seeded();
        let mut names = Vec::new();
        library
            .walk("Edu", |node, depth| names.push(format!("{depth}:{}", node.name)))
            .unwrap();
        assert_eq!(names[0], "0:Medical Training");
        assert_eq!(names.len(), 3);
        assert!(library.walk("Nope", |_, _| {}).is_err());
    }

    #[test]
    fn json_seed_round_trips_and_validates() {
        let library = ContentLibrary::seeded();
        let json = library.to_json().unwrap();
        assert_eq!(ContentLibrary::from_json(&json).unwrap(), library);

        let dup = r#"{"categories": {"A": [
            {"id": 1, "type": 2, "name": "x"},
            {"id": 1, "type": 2, "name": "y"}
        ]}, "currentCategory": "A"}"#;
        assert!(matches!(
            ContentLibrary::from_json(dup),
            Err(LibraryError::ValidationError { .. })
        ));
    }

    proptest! {
        #[test]
        fn selection_tracks_toggle_parity(toggles in proptest::collection::vec(0usize..8, 0..40)) {
            let ids = [334u64, 335, 336, 401, 402, 501, 601, 602];
            let mut library = ContentLibrary::seeded();
            let mut counts = [0usize; 8];
            for &i in &toggles {
                library.toggle_file_selection(ids[i]).unwrap();
                counts[i] += 1;
            }
            for (i, id) in ids.iter().enumerate() {
                prop_assert_eq!(library.selected_files().contains(id), counts[i] % 2 == 1);
            }
            let mut sorted = library.selected_files().to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), library.selected_files().len());
        }
    }
}
