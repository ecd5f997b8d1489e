//! Class index ↔ gesture name mapping, fixed at pipeline construction

use std::sync::Arc;

pub const DEFAULT_GESTURES: &[&str] = &[
    "background",
    "clap",
    "peace",
    "swipe_left",
    "swipe_right",
    "thumbs_down",
    "thumbs_up",
    "wave",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    names: Vec<Arc<str>>,
}

impl LabelTable {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| Arc::from(n.as_ref())).collect(),
        }
    }

    pub fn name(&self, class_index: usize) -> Option<&Arc<str>> {
        self.names.get(class_index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_ref() == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.as_ref())
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(DEFAULT_GESTURES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gestures_round_trip() {
        let labels = LabelTable::default();
        assert_eq!(labels.len(), 8);
        assert_eq!(labels.name(3).map(|n| n.as_ref()), Some("swipe_left"));
        assert_eq!(labels.index_of("wave"), Some(7));
        assert!(labels.name(8).is_none());
        assert!(labels.index_of("salute").is_none());
    }
}
