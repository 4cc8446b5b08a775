use engine::ScriptEntry;
use serde::Serialize;
use tracing::warn;

/// Whether an event was spawned from the script or from post-story
/// freeplay. Only story events move the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum EventOrigin {
    Story,
    Freeplay,
}

#[derive(Debug, Clone)]
pub(crate) struct StorySequencer {
    script: Vec<ScriptEntry>,
    cursor: usize,
}

impl StorySequencer {
    pub(crate) fn new(script: Vec<ScriptEntry>) -> Self {
        Self { script, cursor: 0 }
    }

    pub(crate) fn current_entry(&self) -> Option<&ScriptEntry> {
        self.script.get(self.cursor)
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn script_len(&self) -> usize {
        self.script.len()
    }

    /// Moves the cursor forward by one. Calls past the end of the script
    /// are logged and leave the cursor at `script_len()`.
    pub(crate) fn advance(&mut self) -> usize {
        if self.cursor >= self.script.len() {
            warn!(
                cursor = self.cursor,
                script_len = self.script.len(),
                "script_advance_past_end"
            );
            return self.cursor;
        }
        self.cursor += 1;
        self.cursor
    }

    pub(crate) fn is_story_complete(&self) -> bool {
        matches!(
            self.current_entry(),
            None | Some(ScriptEntry::StoryComplete)
        )
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> Vec<ScriptEntry> {
        vec![
            ScriptEntry::Encounter("swordInStone".to_string()),
            ScriptEntry::Boss("troll".to_string()),
            ScriptEntry::StoryComplete,
        ]
    }

    #[test]
    fn advance_moves_exactly_one_and_caps_at_len() {
        let mut sequencer = StorySequencer::new(script());
        assert_eq!(sequencer.current_entry(), Some(&script()[0]));
        for expected in 1..=3 {
            assert_eq!(sequencer.advance(), expected);
        }
        assert_eq!(sequencer.current_entry(), None);
        assert_eq!(sequencer.advance(), 3);
        assert_eq!(sequencer.cursor(), sequencer.script_len());
    }

    #[test]
    fn story_complete_is_reported_at_sentinel_and_past_end() {
        let mut sequencer = StorySequencer::new(script());
        assert!(!sequencer.is_story_complete());
        sequencer.advance();
        sequencer.advance();
        assert!(sequencer.is_story_complete());
        sequencer.advance();
        assert!(sequencer.is_story_complete());
    }

    #[test]
    fn reset_rewinds_to_start() {
        let mut sequencer = StorySequencer::new(script());
        sequencer.advance();
        sequencer.reset();
        assert_eq!(sequencer.cursor(), 0);
    }
}
