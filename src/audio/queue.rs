//! The playback queue: canonical order, shuffle permutation and cursor.
//!
//! `cursor` always indexes the *active* order, which is `shuffle_order` when
//! shuffle is on and the canonical order otherwise.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::library::{Track, TrackId};

use super::error::EngineError;
use super::types::Direction;

/// What `Queue::remove_tracks` did to the current track.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Removal {
    /// None of the ids were in the queue.
    NoMatch,
    /// Tracks were removed; the current track survived.
    CurrentKept,
    /// The current track was removed and the cursor moved to its successor.
    Advanced,
    /// The current track was removed and nothing follows it.
    Exhausted,
    /// The queue is now empty.
    Emptied,
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    order: Vec<Track>,
    shuffle_order: Vec<usize>,
    shuffle: bool,
    cursor: usize,
}

/// A random permutation of `0..len` with `front` moved to index 0.
fn permutation_with_front<R: Rng + ?Sized>(len: usize, front: usize, rng: &mut R) -> Vec<usize> {
    let mut rest: Vec<usize> = (0..len).filter(|&i| i != front).collect();
    rest.shuffle(rng);
    let mut out = Vec::with_capacity(len);
    out.push(front);
    out.extend(rest);
    out
}

impl Queue {
    /// Build a queue from `tracks`, starting at `start` (the first track when
    /// `None`). With `shuffle`, the start track leads the shuffled order.
    pub fn new<R: Rng + ?Sized>(
        tracks: Vec<Track>,
        start: Option<&str>,
        shuffle: bool,
        rng: &mut R,
    ) -> Result<Self, EngineError> {
        if tracks.is_empty() {
            return Err(EngineError::EmptyQueue);
        }

        let start_idx = match start {
            None => 0,
            Some(id) => tracks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| EngineError::UnknownTrack(id.to_string()))?,
        };

        let (shuffle_order, cursor) = if shuffle {
            (permutation_with_front(tracks.len(), start_idx, rng), 0)
        } else {
            ((0..tracks.len()).collect(), start_idx)
        };

        Ok(Self {
            order: tracks,
            shuffle_order,
            shuffle,
            cursor,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Tracks in canonical order.
    pub fn tracks(&self) -> &[Track] {
        &self.order
    }

    /// Tracks in the order they will play.
    pub fn active_order(&self) -> Vec<&Track> {
        (0..self.len()).map(|p| &self.order[self.canonical_index(p)]).collect()
    }

    fn canonical_index(&self, pos: usize) -> usize {
        if self.shuffle {
            self.shuffle_order[pos]
        } else {
            pos
        }
    }

    fn active_position(&self, canonical: usize) -> usize {
        if self.shuffle {
            self.shuffle_order
                .iter()
                .position(|&i| i == canonical)
                .unwrap_or(0)
        } else {
            canonical
        }
    }

    pub fn current(&self) -> Option<&Track> {
        if self.is_empty() {
            return None;
        }
        self.order.get(self.canonical_index(self.cursor))
    }

    fn neighbour(&self, direction: Direction, wrap: bool) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let last = self.len() - 1;
        match direction {
            Direction::Next if self.cursor < last => Some(self.cursor + 1),
            Direction::Next if wrap => Some(0),
            Direction::Next => None,
            Direction::Previous if self.cursor > 0 => Some(self.cursor - 1),
            Direction::Previous if wrap => Some(last),
            // Clamp at the start instead of wrapping.
            Direction::Previous => Some(0),
        }
    }

    /// The track `advance` would move to, without moving.
    pub fn peek(&self, direction: Direction, wrap: bool) -> Option<&Track> {
        self.neighbour(direction, wrap)
            .map(|pos| &self.order[self.canonical_index(pos)])
    }

    /// Move the cursor one step. `None` means `Next` ran off the end.
    pub fn advance(&mut self, direction: Direction, wrap: bool) -> Option<&Track> {
        let pos = self.neighbour(direction, wrap)?;
        self.cursor = pos;
        self.current()
    }

    /// Turn shuffle on or off, keeping the cursor on the current track.
    ///
    /// Enabling always draws a fresh permutation led by the current track.
    pub fn set_shuffle<R: Rng + ?Sized>(&mut self, enabled: bool, rng: &mut R) {
        if enabled == self.shuffle {
            return;
        }
        if self.is_empty() {
            self.shuffle = enabled;
            return;
        }

        let current = self.canonical_index(self.cursor);
        if enabled {
            self.shuffle_order = permutation_with_front(self.len(), current, rng);
            self.cursor = 0;
        } else {
            self.cursor = current;
        }
        self.shuffle = enabled;
    }

    /// Drop every track whose id is in `ids` from both orders.
    ///
    /// The surviving shuffle order keeps its relative order. When the current
    /// track goes, the cursor moves to the next survivor in the active order,
    /// wrapping to the first survivor only when `wrap` is set.
    pub fn remove_tracks(&mut self, ids: &HashSet<TrackId>, wrap: bool) -> Removal {
        if self.is_empty() || !self.order.iter().any(|t| ids.contains(&t.id)) {
            return Removal::NoMatch;
        }

        let removed = |q: &Queue, canonical: usize| ids.contains(&q.order[canonical].id);
        let current = self.canonical_index(self.cursor);
        let current_removed = removed(self, current);

        let active: Vec<usize> = (0..self.len()).map(|p| self.canonical_index(p)).collect();
        let target = if current_removed {
            let after = active[self.cursor + 1..]
                .iter()
                .copied()
                .find(|&c| !removed(self, c));
            match after {
                Some(c) => Some(c),
                None if wrap => active[..self.cursor]
                    .iter()
                    .copied()
                    .find(|&c| !removed(self, c)),
                None => None,
            }
        } else {
            Some(current)
        };

        // Old canonical index -> new canonical index.
        let mut remap: Vec<Option<usize>> = vec![None; self.len()];
        let mut kept = Vec::with_capacity(self.len());
        for (i, track) in std::mem::take(&mut self.order).into_iter().enumerate() {
            if !ids.contains(&track.id) {
                remap[i] = Some(kept.len());
                kept.push(track);
            }
        }
        self.order = kept;
        self.shuffle_order = if self.shuffle {
            self.shuffle_order.iter().filter_map(|&i| remap[i]).collect()
        } else {
            (0..self.order.len()).collect()
        };

        if self.order.is_empty() {
            self.cursor = 0;
            return Removal::Emptied;
        }

        match target.and_then(|c| remap[c]) {
            Some(new_canonical) => {
                self.cursor = self.active_position(new_canonical);
                if current_removed {
                    Removal::Advanced
                } else {
                    Removal::CurrentKept
                }
            }
            None => {
                self.cursor = self.len() - 1;
                Removal::Exhausted
            }
        }
    }
}
