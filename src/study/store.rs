use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use super::Lesson;

/// Named-slot string storage, the only thing the lesson store needs from
/// the outside world.
pub trait SlotStorage: Send + Sync {
    fn read(&self, slot: &str) -> io::Result<Option<String>>;
    fn write(&self, slot: &str, contents: &str) -> io::Result<()>;
}

/// One `<slot>.json` file per slot inside a directory.
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, slot: &str) -> PathBuf {
        self.root.join(format!("{}.json", slot))
    }
}

impl SlotStorage for DirStorage {
    fn read(&self, slot: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, slot: &str, contents: &str) -> io::Result<()> {
        // Write next to the target and rename, so a crash never leaves half a collection behind
        let path = self.path_for(slot);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    slots: std::sync::Mutex<std::collections::HashMap<String, String>>,
    writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn with_slot(slot: &str, contents: &str) -> Self {
        let storage = Self::default();
        storage.write(slot, contents).unwrap();
        storage
    }

    pub fn writes(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl SlotStorage for MemoryStorage {
    fn read(&self, slot: &str) -> io::Result<Option<String>> {
        Ok(self.slots.lock().unwrap().get(slot).cloned())
    }

    fn write(&self, slot: &str, contents: &str) -> io::Result<()> {
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.slots
            .lock()
            .unwrap()
            .insert(slot.to_string(), contents.to_string());
        Ok(())
    }
}

/// Lets a test keep a handle on the storage it gave away.
#[cfg(test)]
impl SlotStorage for Arc<MemoryStorage> {
    fn read(&self, slot: &str) -> io::Result<Option<String>> {
        self.as_ref().read(slot)
    }

    fn write(&self, slot: &str, contents: &str) -> io::Result<()> {
        self.as_ref().write(slot, contents)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize lessons: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write slot {slot}: {source}")]
    Write {
        slot: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone)]
pub struct LessonStore {
    storage: Arc<dyn SlotStorage>,
}

impl LessonStore {
    pub fn new(storage: impl SlotStorage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    pub fn slot(&self, name: impl Into<String>) -> LessonSlot {
        LessonSlot {
            storage: self.storage.clone(),
            name: name.into(),
        }
    }
}

/// The lesson collection of one owner. Always read and written whole.
#[derive(Clone)]
pub struct LessonSlot {
    storage: Arc<dyn SlotStorage>,
    name: String,
}

impl LessonSlot {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Never fails: a missing, unreadable or malformed slot reads as empty.
    pub fn load(&self) -> Vec<Lesson> {
        match self.storage.read(&self.name) {
            Ok(Some(contents)) => parse_lessons(&self.name, &contents),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Could not read slot {}: {}", self.name, e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, lessons: &[Lesson]) -> Result<(), StoreError> {
        let contents = serde_json::to_string(lessons)?;
        self.storage
            .write(&self.name, &contents)
            .map_err(|source| StoreError::Write {
                slot: self.name.clone(),
                source,
            })?;
        debug!("Saved {} lesson(s) to slot {}", lessons.len(), self.name);
        Ok(())
    }
}

fn parse_lessons(slot: &str, contents: &str) -> Vec<Lesson> {
    let records: Vec<serde_json::Value> = match serde_json::from_str(contents) {
        Ok(records) => records,
        Err(e) => {
            warn!("Slot {} does not hold a lesson list, starting empty: {}", slot, e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut lessons = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let mut lesson: Lesson = match serde_json::from_value(record) {
            Ok(lesson) => lesson,
            Err(e) => {
                warn!("Dropping malformed lesson #{} in slot {}: {}", index, slot, e);
                continue;
            }
        };
        if !lesson.normalize() {
            warn!("Dropping invalid lesson {} in slot {}", lesson.id, slot);
            continue;
        }
        if !seen.insert(lesson.id.clone()) {
            warn!("Dropping duplicate lesson id {} in slot {}", lesson.id, slot);
            continue;
        }
        lessons.push(lesson);
    }
    lessons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::fixtures::*;

    #[test]
    fn missing_slot_loads_empty() {
        let store = LessonStore::new(MemoryStorage::default());
        assert!(store.slot("lessons").load().is_empty());
    }

    #[test]
    fn save_then_load_is_field_for_field_equal() {
        let store = LessonStore::new(MemoryStorage::default());
        let slot = store.slot("lessons");

        let mut quizzed = lesson("a", "Cells", 3);
        quizzed.course = Some("Biology 101".to_string());
        quizzed.image_urls = vec!["https://example.org/cell.png".to_string()];
        quizzed.mcqs = vec![mcq(
            "What is the powerhouse?",
            &["Mitochondria", "Ribosome", "Nucleus", "Wall"],
            "Mitochondria",
        )];
        quizzed.feedback = Some("Add diagrams.".to_string());
        quizzed.record_attempt(attempt(1, 1));
        let lessons = vec![quizzed, lesson("b", "Atoms", 1)];

        slot.save(&lessons).unwrap();
        assert_eq!(slot.load(), lessons);
    }

    #[test]
    fn persisted_layout_uses_camel_case_and_omits_absent_options() {
        let store = LessonStore::new(MemoryStorage::default());
        let slot = store.slot("lessons");
        slot.save(&[lesson("a", "Cells", 1)]).unwrap();

        let raw = store.storage.read("lessons").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let record = &value[0];
        assert!(record.get("imageUrls").is_some());
        assert!(record.get("quizAttempts").is_some());
        assert!(record.get("createdAt").is_some());
        assert!(record.get("course").is_none());
        assert!(record.get("feedback").is_none());
    }

    #[test]
    fn garbage_slot_loads_empty() {
        let store = LessonStore::new(MemoryStorage::with_slot("lessons", "{not json"));
        assert!(store.slot("lessons").load().is_empty());

        let store = LessonStore::new(MemoryStorage::with_slot("lessons", r#"{"id":"a"}"#));
        assert!(store.slot("lessons").load().is_empty());
    }

    #[test]
    fn malformed_records_are_dropped_and_the_rest_kept() {
        let raw = r#"[
            {"id":"a","title":"Kept","notes":"n","imageUrls":[],"week":2,"createdAt":"2024-05-01T10:00:00.000Z","mcqs":[],"quizAttempts":[]},
            {"title":"No id","createdAt":"2024-05-01T10:00:00.000Z"},
            {"id":"c","title":"Bad week","week":-1,"createdAt":"2024-05-01T10:00:00.000Z"},
            {"id":"d","title":"Cheater","createdAt":"2024-05-01T10:00:00.000Z","quizAttempts":[{"score":5,"total":4,"timestamp":"2024-05-01T10:00:00.000Z"}]},
            {"id":"a","title":"Duplicate","createdAt":"2024-05-01T10:00:00.000Z"}
        ]"#;
        let store = LessonStore::new(MemoryStorage::with_slot("lessons", raw));
        let lessons = store.slot("lessons").load();

        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "Kept");
        assert_eq!(lessons[0].week, 2);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let raw = r#"[{"id":"a","title":"Sparse","createdAt":"2024-05-01T10:00:00Z","week":0,"course":""}]"#;
        let store = LessonStore::new(MemoryStorage::with_slot("lessons", raw));
        let lessons = store.slot("lessons").load();

        let lesson = &lessons[0];
        assert_eq!(lesson.week, 1);
        assert_eq!(lesson.course, None);
        assert_eq!(lesson.feedback, None);
        assert!(lesson.notes.is_empty());
        assert!(lesson.mcqs.is_empty());
        assert!(lesson.quiz_attempts.is_empty());
        assert!(lesson.image_urls.is_empty());
    }

    #[test]
    fn dir_storage_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LessonStore::new(DirStorage::open(dir.path().join("lessons")).unwrap());
        let slot = store.slot("lessons-42");

        assert!(slot.load().is_empty());
        let lessons = vec![lesson("a", "Cells", 1)];
        slot.save(&lessons).unwrap();

        assert!(dir.path().join("lessons").join("lessons-42.json").exists());
        assert_eq!(slot.load(), lessons);
        assert!(store.slot("lessons-7").load().is_empty());
    }
}
