use std::collections::BTreeMap;

use engine::EntityId;
use serde::Serialize;

use super::sequencer::EventOrigin;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoryEvent {
    EncounterSpawned {
        template: String,
        origin: EventOrigin,
        guard_count: u32,
    },
    GuardsCleared {
        template: String,
    },
    RewardGranted {
        template: String,
        origin: EventOrigin,
    },
    EncounterRemoved {
        template: String,
    },
    EncounterAbandoned {
        template: String,
    },
    BossRequested {
        boss: String,
    },
    BossDefeated {
        boss: String,
    },
    ShopSpawned {
        visit: u32,
    },
    ShopOpened {
        visit: u32,
    },
    ShopClosed {
        visit: u32,
    },
    ShopRemoved {
        visit: u32,
    },
    PortalOpened {
        portal_id: EntityId,
        stage: u8,
    },
    ArenaEntered {
        stage: u8,
        hostile_count: u32,
    },
    ArenaStageWon {
        stage: u8,
    },
    ArenaExited {
        next_stage: u8,
    },
    ArenaCompleted,
    ScriptAdvanced {
        cursor: usize,
    },
    EntrySkipped {
        kind: &'static str,
        reason: String,
    },
    SessionReset,
}

impl StoryEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::EncounterSpawned { .. } => "encounter_spawned",
            Self::GuardsCleared { .. } => "guards_cleared",
            Self::RewardGranted { .. } => "reward_granted",
            Self::EncounterRemoved { .. } => "encounter_removed",
            Self::EncounterAbandoned { .. } => "encounter_abandoned",
            Self::BossRequested { .. } => "boss_requested",
            Self::BossDefeated { .. } => "boss_defeated",
            Self::ShopSpawned { .. } => "shop_spawned",
            Self::ShopOpened { .. } => "shop_opened",
            Self::ShopClosed { .. } => "shop_closed",
            Self::ShopRemoved { .. } => "shop_removed",
            Self::PortalOpened { .. } => "portal_opened",
            Self::ArenaEntered { .. } => "arena_entered",
            Self::ArenaStageWon { .. } => "arena_stage_won",
            Self::ArenaExited { .. } => "arena_exited",
            Self::ArenaCompleted => "arena_completed",
            Self::ScriptAdvanced { .. } => "script_advanced",
            Self::EntrySkipped { .. } => "entry_skipped",
            Self::SessionReset => "session_reset",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct StoryEventCounts {
    pub(crate) total: u32,
    pub(crate) by_kind: BTreeMap<&'static str, u32>,
}

impl StoryEventCounts {
    fn record(&mut self, event: &StoryEvent) {
        self.total = self.total.saturating_add(1);
        let count = self.by_kind.entry(event.name()).or_default();
        *count = count.saturating_add(1);
    }

    pub(crate) fn get(&self, name: &str) -> u32 {
        self.by_kind.get(name).copied().unwrap_or_default()
    }
}

/// Events emitted since the last rollover, plus per-kind counts of the
/// previous tick. Notifications delivered between ticks land in the next
/// tick's batch.
#[derive(Debug, Default)]
pub(crate) struct StoryEventBus {
    current_tick_events: Vec<StoryEvent>,
    last_tick_counts: StoryEventCounts,
    lifetime_counts: StoryEventCounts,
}

impl StoryEventBus {
    pub(crate) fn emit(&mut self, event: StoryEvent) {
        self.lifetime_counts.record(&event);
        self.current_tick_events.push(event);
    }

    pub(crate) fn iter_emitted_so_far(&self) -> impl Iterator<Item = &StoryEvent> {
        self.current_tick_events.iter()
    }

    pub(crate) fn finish_tick_rollover(&mut self) {
        let mut counts = StoryEventCounts::default();
        for event in &self.current_tick_events {
            counts.record(event);
        }
        self.last_tick_counts = counts;
        self.current_tick_events.clear();
    }

    pub(crate) fn last_tick_counts(&self) -> &StoryEventCounts {
        &self.last_tick_counts
    }

    pub(crate) fn lifetime_counts(&self) -> &StoryEventCounts {
        &self.lifetime_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_moves_current_events_into_counts() {
        let mut bus = StoryEventBus::default();
        bus.emit(StoryEvent::ScriptAdvanced { cursor: 1 });
        bus.emit(StoryEvent::ScriptAdvanced { cursor: 2 });
        bus.emit(StoryEvent::ArenaCompleted);
        assert_eq!(bus.iter_emitted_so_far().count(), 3);

        bus.finish_tick_rollover();
        assert_eq!(bus.iter_emitted_so_far().count(), 0);
        assert_eq!(bus.last_tick_counts().total, 3);
        assert_eq!(bus.last_tick_counts().get("script_advanced"), 2);
        assert_eq!(bus.last_tick_counts().get("shop_opened"), 0);

        bus.finish_tick_rollover();
        assert_eq!(bus.last_tick_counts().total, 0);
        assert_eq!(bus.lifetime_counts().get("arena_completed"), 1);
    }
}
