#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        Vec2::new(other.x - self.x, other.y - self.y).length()
    }

    pub fn offset(self, angle_radians: f32, distance: f32) -> Vec2 {
        Vec2 {
            x: self.x + angle_radians.cos() * distance,
            y: self.y + angle_radians.sin() * distance,
        }
    }

    /// Moves at most `speed` units toward `target` without overshooting it.
    pub fn step_towards(self, target: Vec2, speed: f32) -> Vec2 {
        let dx = target.x - self.x;
        let dy = target.y - self.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= speed || dist <= f32::EPSILON {
            return target;
        }
        Vec2 {
            x: self.x + dx / dist * speed,
            y: self.y + dy / dist * speed,
        }
    }
}

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
pub const CAMERA_ZOOM_MIN: f32 = 0.5;
pub const CAMERA_ZOOM_MAX: f32 = 3.0;
const CAMERA_ZOOM_EASE_PER_SECOND: f32 = 3.0;

#[derive(Debug, Clone, Copy)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
    pub target_zoom: f32,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            position: Vec2::default(),
            zoom: CAMERA_ZOOM_DEFAULT,
            target_zoom: CAMERA_ZOOM_DEFAULT,
        }
    }
}

impl Camera2D {
    pub fn effective_zoom(&self) -> f32 {
        clamp_camera_zoom(self.zoom)
    }

    pub fn set_target_zoom(&mut self, zoom: f32) {
        self.target_zoom = clamp_camera_zoom(zoom);
    }

    pub fn ease_towards_target(&mut self, fixed_dt_seconds: f32) {
        let blend = (CAMERA_ZOOM_EASE_PER_SECOND * fixed_dt_seconds).clamp(0.0, 1.0);
        self.zoom = clamp_camera_zoom(self.zoom + (self.target_zoom - self.zoom) * blend);
    }
}

fn clamp_camera_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return CAMERA_ZOOM_DEFAULT;
    }
    zoom.clamp(CAMERA_ZOOM_MIN, CAMERA_ZOOM_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Player,
    Structure,
    Guard,
    Npc,
    Portal,
    Hostile,
    Boss,
    Reward,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: ActorKind,
    pub label: String,
    pub position: Vec2,
    pub scale: Vec2,
    applied_spawn_order: u64,
}

impl Entity {
    pub fn applied_spawn_order(&self) -> u64 {
        self.applied_spawn_order
    }
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Actor placement service. Placement and removal are deferred until
/// `apply_pending`, but position reads and moves see queued actors too.
#[derive(Debug, Default)]
pub struct SceneWorld {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<Entity>,
    pending_despawns: Vec<EntityId>,
    next_applied_spawn_order: u64,
    camera: Camera2D,
}

impl SceneWorld {
    pub fn place_actor(
        &mut self,
        kind: ActorKind,
        label: impl Into<String>,
        position: Vec2,
        scale: Vec2,
    ) -> EntityId {
        let id = self.allocator.allocate();
        self.pending_spawns.push(Entity {
            id,
            kind,
            label: label.into(),
            position,
            scale,
            applied_spawn_order: 0,
        });
        id
    }

    pub fn remove_actor(&mut self, id: EntityId) -> bool {
        let exists_now = self.entities.iter().any(|entity| entity.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|entity| entity.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn move_actor(&mut self, id: EntityId, position: Vec2) -> bool {
        match self.find_any_mut(id) {
            Some(entity) => {
                entity.position = position;
                true
            }
            None => false,
        }
    }

    pub fn actor_position(&self, id: EntityId) -> Option<Vec2> {
        if self.pending_despawns.contains(&id) {
            return None;
        }
        self.entities
            .iter()
            .chain(self.pending_spawns.iter())
            .find(|entity| entity.id == id)
            .map(|entity| entity.position)
    }

    pub fn set_camera_zoom(&mut self, target: f32) {
        self.camera.set_target_zoom(target);
    }

    pub fn tick_camera(&mut self, fixed_dt_seconds: f32) {
        self.camera.ease_towards_target(fixed_dt_seconds);
    }

    pub fn apply_pending(&mut self) {
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_by_key(|id| id.0);
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            self.entities.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_spawns.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_despawns.clear();
        }

        if !self.pending_spawns.is_empty() {
            for mut entity in self.pending_spawns.drain(..) {
                entity.applied_spawn_order = self.next_applied_spawn_order;
                self.next_applied_spawn_order = self.next_applied_spawn_order.saturating_add(1);
                self.entities.push(entity);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.next_applied_spawn_order = 0;
        self.camera = Camera2D::default();
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn count_of_kind(&self, kind: ActorKind) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.kind == kind)
            .count()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    fn find_any_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if self.pending_despawns.contains(&id) {
            return None;
        }
        self.entities
            .iter_mut()
            .chain(self.pending_spawns.iter_mut())
            .find(|entity| entity.id == id)
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand;
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place_guard(world: &mut SceneWorld, x: f32) -> EntityId {
        world.place_actor(
            ActorKind::Guard,
            "guard",
            Vec2 { x, y: 0.0 },
            Vec2 { x: 1.0, y: 1.0 },
        )
    }

    #[test]
    fn allocator_never_reuses_ids() {
        let mut allocator = EntityIdAllocator::default();
        let first = allocator.allocate();
        let second = allocator.allocate();
        let third = allocator.allocate();

        assert_eq!(first.0, 0);
        assert_eq!(second.0, 1);
        assert_eq!(third.0, 2);
    }

    #[test]
    fn place_and_remove_updates_count_after_apply() {
        let mut world = SceneWorld::default();
        let id = place_guard(&mut world, 0.0);
        assert_eq!(world.entity_count(), 0);
        world.apply_pending();
        assert_eq!(world.entity_count(), 1);

        assert!(world.remove_actor(id));
        world.apply_pending();
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn remove_unknown_actor_returns_false() {
        let mut world = SceneWorld::default();
        assert!(!world.remove_actor(EntityId(99)));
    }

    #[test]
    fn queued_actor_can_be_moved_and_read_before_apply() {
        let mut world = SceneWorld::default();
        let id = place_guard(&mut world, 1.0);
        assert!(world.move_actor(id, Vec2 { x: 4.0, y: 2.0 }));
        assert_eq!(world.actor_position(id), Some(Vec2 { x: 4.0, y: 2.0 }));
        world.apply_pending();
        assert_eq!(
            world.find_entity(id).map(|entity| entity.position),
            Some(Vec2 { x: 4.0, y: 2.0 })
        );
    }

    #[test]
    fn removing_a_queued_spawn_drops_it_on_apply() {
        let mut world = SceneWorld::default();
        let id = place_guard(&mut world, 0.0);
        assert!(world.remove_actor(id));
        assert_eq!(world.actor_position(id), None);
        world.apply_pending();
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn apply_order_is_monotonic() {
        let mut world = SceneWorld::default();
        let a = place_guard(&mut world, 0.0);
        let b = place_guard(&mut world, 1.0);
        world.apply_pending();
        let order_a = world.find_entity(a).expect("a").applied_spawn_order();
        let order_b = world.find_entity(b).expect("b").applied_spawn_order();
        assert!(order_a < order_b);
    }

    #[test]
    fn camera_zoom_target_is_clamped() {
        let mut world = SceneWorld::default();
        world.set_camera_zoom(10.0);
        assert_eq!(world.camera().target_zoom, CAMERA_ZOOM_MAX);
        world.set_camera_zoom(f32::NAN);
        assert_eq!(world.camera().target_zoom, CAMERA_ZOOM_DEFAULT);
    }

    #[test]
    fn camera_eases_toward_target() {
        let mut world = SceneWorld::default();
        world.set_camera_zoom(2.0);
        for _ in 0..240 {
            world.tick_camera(1.0 / 60.0);
        }
        assert!((world.camera().effective_zoom() - 2.0).abs() < 0.01);
    }

    #[test]
    fn step_towards_never_overshoots() {
        let start = Vec2::ZERO;
        let target = Vec2 { x: 0.5, y: 0.0 };
        assert_eq!(start.step_towards(target, 2.0), target);
        let stepped = start.step_towards(Vec2 { x: 10.0, y: 0.0 }, 2.0);
        assert!((stepped.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn clear_releases_everything() {
        let mut world = SceneWorld::default();
        place_guard(&mut world, 0.0);
        world.apply_pending();
        place_guard(&mut world, 1.0);
        world.set_camera_zoom(2.0);
        world.clear();
        world.apply_pending();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.camera().target_zoom, CAMERA_ZOOM_DEFAULT);
    }
}
