use crate::state::game::Song;

/// A player's personal chronology of correctly placed songs.
///
/// Cards only enter through [`Timeline::try_place`], which refuses any
/// position that would break the ascending year order. Equal years are
/// accepted on either side of a boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    cards: Vec<Song>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Songs placed so far, ascending by year.
    pub fn cards(&self) -> &[Song] {
        &self.cards
    }

    /// Number of placed songs.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether no song has been placed yet.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Number of positions a card can be dropped into.
    ///
    /// An empty timeline still offers two slots: before and after the
    /// player's start year.
    pub fn slot_count(&self) -> usize {
        if self.cards.is_empty() {
            2
        } else {
            self.cards.len() + 1
        }
    }

    /// Whether a song released in `year` belongs at `position`.
    pub fn accepts(&self, start_year: i32, year: i32, position: usize) -> bool {
        if self.cards.is_empty() {
            return match position {
                0 => year <= start_year,
                1 => year >= start_year,
                _ => false,
            };
        }

        if position > self.cards.len() {
            return false;
        }

        let lower = position
            .checked_sub(1)
            .and_then(|index| self.cards.get(index))
            .map(|song| song.year);
        let upper = self.cards.get(position).map(|song| song.year);

        lower.is_none_or(|lower| lower <= year) && upper.is_none_or(|upper| year <= upper)
    }

    /// Insert `song` at `position` if the placement is correct.
    ///
    /// Returns whether the song was inserted.
    pub fn try_place(&mut self, start_year: i32, position: usize, song: Song) -> bool {
        if !self.accepts(start_year, song.year, position) {
            return false;
        }

        let index = position.min(self.cards.len());
        self.cards.insert(index, song);
        true
    }

    /// Whether the cards are in ascending year order.
    pub fn is_sorted(&self) -> bool {
        self.cards.windows(2).all(|pair| pair[0].year <= pair[1].year)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn song(year: i32) -> Song {
        Song {
            id: format!("song-{year}"),
            title: format!("Hit of {year}"),
            artist: "Various".into(),
            year,
            cover_url: None,
            preview_url: None,
        }
    }

    fn timeline(years: &[i32]) -> Timeline {
        Timeline {
            cards: years.iter().copied().map(song).collect(),
        }
    }

    #[test]
    fn empty_timeline_compares_against_start_year() {
        let empty = Timeline::new();

        assert!(empty.accepts(1970, 1965, 0));
        assert!(!empty.accepts(1970, 1975, 0));
        assert!(empty.accepts(1970, 1975, 1));
        assert!(!empty.accepts(1970, 1965, 1));
        assert!(!empty.accepts(1970, 1970, 2));
        assert_eq!(empty.slot_count(), 2);
    }

    #[test]
    fn boundaries_are_inclusive_on_both_sides() {
        let empty = Timeline::new();
        assert!(empty.accepts(1970, 1970, 0));
        assert!(empty.accepts(1970, 1970, 1));

        let line = timeline(&[1965, 1980]);
        assert!(line.accepts(1970, 1965, 0));
        assert!(line.accepts(1970, 1965, 1));
        assert!(line.accepts(1970, 1980, 1));
        assert!(line.accepts(1970, 1980, 2));
    }

    #[test]
    fn interior_position_needs_both_neighbours() {
        let line = timeline(&[1965, 1980, 1995]);

        assert!(line.accepts(1970, 1972, 1));
        assert!(!line.accepts(1970, 1972, 2));
        assert!(line.accepts(1970, 1990, 2));
        assert!(!line.accepts(1970, 1960, 1));
        assert!(line.accepts(1970, 2001, 3));
        assert!(!line.accepts(1970, 2001, 4));
        assert_eq!(line.slot_count(), 4);
    }

    #[test]
    fn start_year_is_ignored_once_cards_exist() {
        let line = timeline(&[1965]);
        // 1972 is after the 1970 anchor but before is still wrong.
        assert!(!line.accepts(1970, 1972, 0));
        assert!(line.accepts(1970, 1972, 1));
    }

    #[test]
    fn rejected_placement_leaves_timeline_unchanged() {
        let mut line = timeline(&[1965, 1980]);
        assert!(!line.try_place(1970, 0, song(1972)));
        assert_eq!(line, timeline(&[1965, 1980]));

        assert!(line.try_place(1970, 1, song(1972)));
        assert_eq!(line, timeline(&[1965, 1972, 1980]));
    }

    #[test]
    fn first_card_after_anchor_lands_at_index_zero() {
        let mut line = Timeline::new();
        assert!(line.try_place(1970, 1, song(1985)));
        assert_eq!(line.cards()[0].year, 1985);
    }

    proptest! {
        #[test]
        fn timeline_stays_sorted(
            start_year in 1900i32..2030,
            attempts in prop::collection::vec((1900i32..2030, 0usize..12), 0..64),
        ) {
            let mut line = Timeline::new();
            for (year, position) in attempts {
                let before = line.len();
                let placed = line.try_place(start_year, position, song(year));
                prop_assert_eq!(line.len(), before + usize::from(placed));
                prop_assert!(line.is_sorted());
            }
        }

        #[test]
        fn some_slot_always_fits(
            start_year in 1900i32..2030,
            years in prop::collection::vec(1900i32..2030, 0..16),
            year in 1900i32..2030,
        ) {
            let mut sorted = years;
            sorted.sort_unstable();
            let line = timeline(&sorted);
            prop_assert!((0..line.slot_count()).any(|slot| line.accepts(start_year, year, slot)));
        }
    }
}
