use serde::Serialize;

/// What is occupying the world right now, as seen by the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct GateSnapshot {
    pub(crate) encounter_active: bool,
    pub(crate) story_boss_active: bool,
    pub(crate) bosses_alive: u32,
    pub(crate) arena_busy: bool,
    pub(crate) shop_visit_active: bool,
    pub(crate) shop_ui_active: bool,
    pub(crate) player_level: u32,
    pub(crate) min_player_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateBlock {
    Encounter,
    Boss,
    Arena,
    Shop,
    PlayerLevel,
}

impl GateBlock {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Encounter => "encounter",
            Self::Boss => "boss",
            Self::Arena => "arena",
            Self::Shop => "shop",
            Self::PlayerLevel => "player_level",
        }
    }
}

/// Proof that the gate was clear when a spawn began. Only
/// [`EventGate::admit`] can build one, and every spawn routine consumes one.
#[derive(Debug)]
pub(crate) struct SpawnPermit(());

pub(crate) struct EventGate;

impl EventGate {
    pub(crate) fn can_start_major_event(snapshot: &GateSnapshot) -> bool {
        Self::blocker(snapshot).is_none()
    }

    pub(crate) fn blocker(snapshot: &GateSnapshot) -> Option<GateBlock> {
        if snapshot.encounter_active {
            Some(GateBlock::Encounter)
        } else if snapshot.story_boss_active || snapshot.bosses_alive > 0 {
            Some(GateBlock::Boss)
        } else if snapshot.arena_busy {
            Some(GateBlock::Arena)
        } else if snapshot.shop_visit_active || snapshot.shop_ui_active {
            Some(GateBlock::Shop)
        } else if snapshot.player_level < snapshot.min_player_level {
            Some(GateBlock::PlayerLevel)
        } else {
            None
        }
    }

    pub(crate) fn admit(snapshot: &GateSnapshot) -> Result<SpawnPermit, GateBlock> {
        if Self::can_start_major_event(snapshot) {
            Ok(SpawnPermit(()))
        } else {
            Err(Self::blocker(snapshot).unwrap_or(GateBlock::Encounter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear() -> GateSnapshot {
        GateSnapshot {
            player_level: 5,
            min_player_level: 1,
            ..GateSnapshot::default()
        }
    }

    #[test]
    fn clear_world_admits() {
        assert!(EventGate::can_start_major_event(&clear()));
        assert!(EventGate::admit(&clear()).is_ok());
    }

    #[test]
    fn each_active_event_blocks() {
        let cases = [
            (
                GateSnapshot {
                    encounter_active: true,
                    ..clear()
                },
                GateBlock::Encounter,
            ),
            (
                GateSnapshot {
                    story_boss_active: true,
                    ..clear()
                },
                GateBlock::Boss,
            ),
            (
                GateSnapshot {
                    bosses_alive: 2,
                    ..clear()
                },
                GateBlock::Boss,
            ),
            (
                GateSnapshot {
                    arena_busy: true,
                    ..clear()
                },
                GateBlock::Arena,
            ),
            (
                GateSnapshot {
                    shop_visit_active: true,
                    ..clear()
                },
                GateBlock::Shop,
            ),
            (
                GateSnapshot {
                    shop_ui_active: true,
                    ..clear()
                },
                GateBlock::Shop,
            ),
        ];
        for (snapshot, expected) in cases {
            assert!(!EventGate::can_start_major_event(&snapshot));
            assert_eq!(EventGate::admit(&snapshot).map(|_| ()), Err(expected));
        }
    }

    #[test]
    fn low_player_level_blocks() {
        let snapshot = GateSnapshot {
            player_level: 3,
            min_player_level: 4,
            ..GateSnapshot::default()
        };
        assert_eq!(EventGate::blocker(&snapshot), Some(GateBlock::PlayerLevel));
    }
}
