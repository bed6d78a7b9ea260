use std::collections::HashSet;

use roster_directory::{Participant, UserId};

use crate::settings::PickerSettings;

/// Turns one fetch result into the list the view renders.
///
/// Results are ordered by category rank and then case-folded display name; the sort is
/// stable so equal keys keep directory order. Entries whose user id is in `selected` are
/// flagged, all others keep the flag the directory returned.
pub fn present(
    mut results: Vec<Participant>,
    selected: &[Participant],
    settings: &PickerSettings,
) -> Vec<Participant> {
    sort_participants(&mut results, settings);
    annotate_selection(&mut results, selected);
    results
}

pub fn sort_participants(participants: &mut [Participant], settings: &PickerSettings) {
    participants.sort_by_cached_key(|participant| {
        (
            settings.priority_of(&participant.source),
            participant.display_name.to_lowercase(),
        )
    });
}

pub fn annotate_selection(participants: &mut [Participant], selected: &[Participant]) {
    let selected_ids = selected
        .iter()
        .map(|participant| &participant.user_id)
        .collect::<HashSet<&UserId>>();

    for participant in participants.iter_mut() {
        if selected_ids.contains(&participant.user_id) {
            participant.selected = true;
        }
    }
}
