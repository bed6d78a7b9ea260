use indexmap::IndexMap;
use roster_directory::{Participant, UserId};

/// Participants chosen so far, unique by user id and kept in selection order.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    entries: IndexMap<UserId, Participant>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant. A second selection of the same user id is ignored so the
    /// original position and value are kept.
    pub fn insert(&mut self, participant: Participant) -> bool {
        if self.entries.contains_key(&participant.user_id) {
            return false;
        }

        self.entries.insert(participant.user_id.clone(), participant);
        true
    }

    pub fn remove(&mut self, user_id: &UserId) -> Option<Participant> {
        self.entries.shift_remove(user_id)
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_directory::ParticipantSource;

    fn user(id: &str, name: &str) -> Participant {
        Participant::new(id, name, ParticipantSource::Users)
    }

    fn ids(selection: &SelectionSet) -> Vec<String> {
        selection
            .iter()
            .map(|participant| participant.user_id.to_string())
            .collect()
    }

    #[test]
    fn removal_preserves_selection_order() {
        let mut selection = SelectionSet::new();
        for (id, name) in [("u1", "alice"), ("u2", "Bob"), ("u3", "carol"), ("u4", "Dan")] {
            assert!(selection.insert(user(id, name)));
        }

        assert!(selection.remove(&UserId::new("u2")).is_some());
        assert!(selection.remove(&UserId::new("u9")).is_none());
        assert!(selection.insert(user("u2", "Bob")));

        assert_eq!(ids(&selection), vec!["u1", "u3", "u4", "u2"]);
    }

    #[test]
    fn duplicate_user_id_is_rejected() {
        let mut selection = SelectionSet::new();
        assert!(selection.insert(user("u1", "alice")));
        assert!(selection.insert(user("u2", "Bob")));
        assert!(!selection.insert(user("u1", "Alice (renamed)")));

        assert_eq!(selection.len(), 2);
        assert_eq!(ids(&selection), vec!["u1", "u2"]);
        assert_eq!(selection.snapshot()[0].display_name, "alice");
    }
}
