//! Deterministic tile course that plays the host side of the controller
//!
//! Map legend:
//! - `.` empty
//! - `#` solid
//! - `^` spikes
//! - `S` spawn
//! - `G` goal
//! - `C` cutscene trigger
//! - `1`..`9` intermediate targets, visited in order before the goal
//!
//! Coordinates are pixels with y pointing down. The course advances one
//! fixed step per consumed frame.

use std::path::Path;

use anyhow::{Context, Result, bail};
use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};
use summit_core::{
    Buttons, ControllerFrame, CutsceneStatus, EnvironmentSnapshot, HostStatus, ScalarSenses,
    SnapshotError,
};

pub const TILE_SIZE: f32 = 8.0;

/// Player collision box half extents
const HALF_EXTENTS: Vec2 = Vec2::new(3.0, 4.0);

/// Menu entries of the pause menu shown over a cutscene
const MENU_RESUME: usize = 0;
const MENU_SKIP: usize = 1;

pub const DEFAULT_COURSE: &str = "\
########################################
#......................................#
#......................................#
#......................................#
#..............................G.......#
#...........................######.....#
#......................................#
#...................3..................#
#................#######...............#
#......................................#
#...........2..........................#
#.........#####........................#
#...1..............C...................#
#S.................#.......^^^.........#
#######...##############################
#######^^^##############################";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Empty,
    Solid,
    Spike,
    Goal,
    CutsceneTrigger,
}

impl Tile {
    /// Vision grid value: solid is positive, hazards negative
    fn vision_value(self) -> f32 {
        match self {
            Tile::Solid => 1.0,
            Tile::Spike => -1.0,
            Tile::Empty | Tile::Goal | Tile::CutsceneTrigger => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Pixels per second
    pub run_speed: f32,
    /// Fraction of the gap to the target run speed closed per frame
    pub run_response: f32,
    pub gravity: f32,
    pub max_fall_speed: f32,
    pub jump_speed: f32,
    /// Upward speed kept when jump is released mid-air
    pub jump_release_factor: f32,
    pub dash_speed: f32,
    pub dash_frames: u32,
    pub climb_speed: f32,
    pub max_stamina: f32,
    /// Stamina spent per frame while grabbing a wall
    pub grab_drain: f32,
    /// Frames between dying and respawning
    pub respawn_frames: u32,
    /// Frames a cutscene plays when nobody skips it
    pub cutscene_frames: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            run_speed: 90.0,
            run_response: 0.35,
            gravity: 900.0,
            max_fall_speed: 240.0,
            jump_speed: 160.0,
            jump_release_factor: 0.5,
            dash_speed: 240.0,
            dash_frames: 10,
            climb_speed: 45.0,
            max_stamina: 110.0,
            grab_drain: 1.0,
            respawn_frames: 30,
            cutscene_frames: 600,
        }
    }
}

/// Counters over the lifetime of a course
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CourseStats {
    pub frames: u64,
    pub deaths: u32,
    pub restarts: u32,
    pub goals: u32,
    pub cutscenes_started: u32,
    pub cutscenes_skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Playing,
    Dead { remaining: u32 },
    Cutscene { remaining: u32, menu: Option<usize> },
    RestartDialog,
}

#[derive(Debug, Clone)]
struct Player {
    position: Vec2,
    velocity: Vec2,
    on_ground: bool,
    on_wall: bool,
    can_dash: bool,
    stamina: f32,
    dash_remaining: u32,
    facing: f32,
    jump_held: bool,
}

impl Player {
    fn spawn(position: Vec2, stamina: f32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            on_ground: false,
            on_wall: false,
            can_dash: true,
            stamina,
            dash_remaining: 0,
            facing: 1.0,
            jump_held: false,
        }
    }
}

pub struct Course {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
    spawn: Vec2,
    targets: Vec<Vec2>,
    physics: PhysicsConfig,
    player: Player,
    mode: Mode,
    cutscene_armed: bool,
    stats: CourseStats,
}

impl Course {
    /// Parse a course map
    pub fn parse(map: &str, physics: PhysicsConfig) -> Result<Self> {
        let rows: Vec<&str> = map
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.is_empty() {
            bail!("Course map is empty");
        }

        let width = rows[0].chars().count();
        let height = rows.len();
        let mut tiles = Vec::with_capacity(width * height);
        let mut spawn = None;
        let mut goal = None;
        let mut numbered: Vec<(u32, Vec2)> = Vec::new();

        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                bail!(
                    "Course row {} has {} tiles, expected {}",
                    y,
                    row.chars().count(),
                    width
                );
            }
            for (x, c) in row.chars().enumerate() {
                let center = tile_center(x as i32, y as i32);
                let tile = match c {
                    '.' => Tile::Empty,
                    '#' => Tile::Solid,
                    '^' => Tile::Spike,
                    'C' => Tile::CutsceneTrigger,
                    'G' => {
                        goal = Some(center);
                        Tile::Goal
                    }
                    'S' => {
                        spawn = Some(center);
                        Tile::Empty
                    }
                    '1'..='9' => {
                        numbered.push((c.to_digit(10).unwrap_or_default(), center));
                        Tile::Empty
                    }
                    other => bail!("Unknown course tile '{}' at ({}, {})", other, x, y),
                };
                tiles.push(tile);
            }
        }

        let spawn = spawn.context("Course has no spawn tile 'S'")?;
        let goal = goal.context("Course has no goal tile 'G'")?;
        numbered.sort_by_key(|(n, _)| *n);
        let mut targets: Vec<Vec2> = numbered.into_iter().map(|(_, p)| p).collect();
        targets.push(goal);

        log::debug!(
            "Parsed {}x{} course with {} targets",
            width,
            height,
            targets.len()
        );

        let player = Player::spawn(spawn, physics.max_stamina);
        Ok(Self {
            width,
            height,
            tiles,
            spawn,
            targets,
            physics,
            player,
            mode: Mode::Playing,
            cutscene_armed: true,
            stats: CourseStats::default(),
        })
    }

    pub fn from_file(path: &Path, physics: PhysicsConfig) -> Result<Self> {
        let map = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read course {}", path.display()))?;
        Self::parse(&map, physics)
            .with_context(|| format!("Failed to parse course {}", path.display()))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn spawn(&self) -> Vec2 {
        self.spawn
    }

    /// Numbered targets in order, goal last
    pub fn targets(&self) -> &[Vec2] {
        &self.targets
    }

    pub fn player_position(&self) -> Vec2 {
        self.player.position
    }

    pub fn stats(&self) -> CourseStats {
        self.stats
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.mode, Mode::Dead { .. })
    }

    /// Tile at a grid coordinate. Outside the map is solid, except below
    /// it where the player falls out.
    pub fn tile(&self, cell: IVec2) -> Tile {
        if cell.y >= self.height as i32 {
            return Tile::Empty;
        }
        if cell.x < 0 || cell.y < 0 || cell.x >= self.width as i32 {
            return Tile::Solid;
        }
        self.tiles[cell.y as usize * self.width + cell.x as usize]
    }

    /// Vision grid centered on the player's tile, plus the player senses
    pub fn snapshot(
        &self,
        vision_width: usize,
        vision_height: usize,
    ) -> Result<EnvironmentSnapshot, SnapshotError> {
        let center = tile_of(self.player.position);
        let origin = center - IVec2::new(vision_width as i32 / 2, vision_height as i32 / 2);

        let mut vision = Vec::with_capacity(vision_width * vision_height);
        for y in 0..vision_height as i32 {
            for x in 0..vision_width as i32 {
                vision.push(self.tile(origin + IVec2::new(x, y)).vision_value());
            }
        }

        let senses = ScalarSenses {
            velocity: self.player.velocity,
            can_dash: self.player.can_dash,
            stamina: self.player.stamina / self.physics.max_stamina.max(f32::EPSILON),
            on_ground: self.player.on_ground,
            on_wall: self.player.on_wall,
        };
        EnvironmentSnapshot::new(
            vision_width,
            vision_height,
            vision,
            senses,
            self.player.position,
        )
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            cutscene: match self.mode {
                Mode::Cutscene { .. } => CutsceneStatus::InCutscene,
                _ => CutsceneStatus::NotInCutscene,
            },
            quick_restart_pending: self.mode == Mode::RestartDialog,
            is_dead: self.is_dead(),
        }
    }

    /// Advance one frame under the given input
    pub fn step(&mut self, frame: &ControllerFrame) {
        self.stats.frames += 1;

        match self.mode {
            Mode::Dead { remaining } => {
                if remaining <= 1 {
                    self.respawn();
                } else {
                    self.mode = Mode::Dead {
                        remaining: remaining - 1,
                    };
                }
            }
            Mode::Cutscene { remaining, menu } => self.step_cutscene(frame, remaining, menu),
            Mode::RestartDialog => {
                if frame.pressed(Buttons::MENU_CONFIRM) {
                    self.stats.restarts += 1;
                    log::trace!("Restart confirmed");
                    self.respawn();
                    self.cutscene_armed = true;
                } else if frame.pressed(Buttons::MENU_CANCEL) {
                    self.mode = Mode::Playing;
                }
            }
            Mode::Playing => {
                if frame.pressed(Buttons::QUICK_RESTART) {
                    self.mode = Mode::RestartDialog;
                } else {
                    self.step_player(frame);
                }
            }
        }
    }

    fn step_cutscene(&mut self, frame: &ControllerFrame, remaining: u32, menu: Option<usize>) {
        let menu = match menu {
            None if frame.pressed(Buttons::ESCAPE) => Some(MENU_RESUME),
            None => None,
            Some(_) if frame.buttons.intersects(Buttons::ESCAPE | Buttons::MENU_CANCEL) => None,
            Some(selected) if frame.pressed(Buttons::MENU_DOWN) => {
                Some((selected + 1).min(MENU_SKIP))
            }
            Some(MENU_SKIP) if frame.pressed(Buttons::MENU_CONFIRM) => {
                self.stats.cutscenes_skipped += 1;
                log::trace!("Cutscene skipped");
                self.mode = Mode::Playing;
                return;
            }
            Some(_) if frame.pressed(Buttons::MENU_CONFIRM) => None,
            Some(selected) => Some(selected),
        };

        // The cutscene only plays while the menu is closed
        let remaining = if menu.is_none() {
            remaining.saturating_sub(1)
        } else {
            remaining
        };
        self.mode = if remaining == 0 {
            Mode::Playing
        } else {
            Mode::Cutscene { remaining, menu }
        };
    }

    fn step_player(&mut self, frame: &ControllerFrame) {
        let dt = 1.0 / 60.0;
        let physics = self.physics.clone();
        let jump = frame.pressed(Buttons::JUMP);
        let jump_pressed = jump && !self.player.jump_held;
        self.player.jump_held = jump;

        if frame.move_x.abs() > 0.3 {
            self.player.facing = frame.move_x.signum();
        }

        let grabbing = self.player.on_wall
            && frame.pressed(Buttons::GRAB)
            && self.player.stamina > 0.0
            && self.player.dash_remaining == 0;

        if frame.pressed(Buttons::DASH) && self.player.can_dash && self.player.dash_remaining == 0 {
            // Aim is up-positive, the course is down-positive
            let aim = frame
                .aim
                .map(|a| Vec2::new(a.x, -a.y))
                .filter(|a| a.length_squared() > 1e-4)
                .unwrap_or(Vec2::new(self.player.facing, 0.0));
            self.player.velocity = aim.normalize_or_zero() * physics.dash_speed;
            self.player.dash_remaining = physics.dash_frames;
            self.player.can_dash = false;
        }

        if self.player.dash_remaining > 0 {
            self.player.dash_remaining -= 1;
        } else {
            let target = frame.move_x * physics.run_speed;
            self.player.velocity.x += (target - self.player.velocity.x) * physics.run_response;

            if grabbing {
                self.player.velocity.y = -frame.move_y * physics.climb_speed;
                self.player.stamina = (self.player.stamina - physics.grab_drain).max(0.0);
            } else {
                self.player.velocity.y =
                    (self.player.velocity.y + physics.gravity * dt).min(physics.max_fall_speed);
                if !jump && self.player.velocity.y < 0.0 {
                    self.player.velocity.y *= physics.jump_release_factor;
                }
            }

            if jump_pressed && (self.player.on_ground || grabbing) {
                self.player.velocity.y = -physics.jump_speed;
                if grabbing && !self.player.on_ground {
                    let away = if self.touches_solid(Vec2::new(-1.0, 0.0)) {
                        1.0
                    } else {
                        -1.0
                    };
                    self.player.velocity.x = away * physics.run_speed;
                }
            }
        }

        let delta = self.player.velocity * dt;
        if self.move_axis(Vec2::new(delta.x, 0.0)) {
            self.player.velocity.x = 0.0;
        }
        if self.move_axis(Vec2::new(0.0, delta.y)) {
            self.player.velocity.y = 0.0;
        }

        self.player.on_ground = self.touches_solid(Vec2::new(0.0, 1.0));
        self.player.on_wall =
            self.touches_solid(Vec2::new(-1.0, 0.0)) || self.touches_solid(Vec2::new(1.0, 0.0));
        if self.player.on_ground {
            self.player.can_dash = true;
            self.player.stamina = physics.max_stamina;
        }

        self.check_tiles();
    }

    /// Move in unit steps, stopping at the first solid overlap.
    /// Returns true when blocked.
    fn move_axis(&mut self, delta: Vec2) -> bool {
        let distance = delta.length();
        if distance <= f32::EPSILON {
            return false;
        }
        let steps = distance.ceil() as u32;
        let step = delta / steps as f32;
        for _ in 0..steps {
            let next = self.player.position + step;
            if self.overlaps(next, |t| t == Tile::Solid) {
                return true;
            }
            self.player.position = next;
        }
        false
    }

    fn touches_solid(&self, offset: Vec2) -> bool {
        self.overlaps(self.player.position + offset, |t| t == Tile::Solid)
    }

    fn overlaps(&self, center: Vec2, matches: impl Fn(Tile) -> bool) -> bool {
        let min = tile_of(center - HALF_EXTENTS);
        let max = tile_of(center + HALF_EXTENTS - Vec2::splat(1e-3));
        (min.y..=max.y).any(|y| (min.x..=max.x).any(|x| matches(self.tile(IVec2::new(x, y)))))
    }

    fn check_tiles(&mut self) {
        let position = self.player.position;
        if position.y - HALF_EXTENTS.y > self.height as f32 * TILE_SIZE
            || self.overlaps(position, |t| t == Tile::Spike)
        {
            self.die();
            return;
        }

        if self.overlaps(position, |t| t == Tile::Goal) {
            self.stats.goals += 1;
        }

        if self.cutscene_armed && self.overlaps(position, |t| t == Tile::CutsceneTrigger) {
            self.cutscene_armed = false;
            self.stats.cutscenes_started += 1;
            self.player.velocity = Vec2::ZERO;
            self.mode = Mode::Cutscene {
                remaining: self.physics.cutscene_frames.max(1),
                menu: None,
            };
        }
    }

    fn die(&mut self) {
        self.stats.deaths += 1;
        log::trace!("Player died at {:?}", self.player.position);
        self.mode = Mode::Dead {
            remaining: self.physics.respawn_frames.max(1),
        };
    }

    fn respawn(&mut self) {
        self.player = Player::spawn(self.spawn, self.physics.max_stamina);
        self.mode = Mode::Playing;
    }
}

fn tile_center(x: i32, y: i32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) * TILE_SIZE,
        (y as f32 + 0.5) * TILE_SIZE,
    )
}

fn tile_of(position: Vec2) -> IVec2 {
    (position / TILE_SIZE).floor().as_ivec2()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "\
##########
#........#
#........#
#S.C...G.#
##########";

    fn course(map: &str) -> Course {
        Course::parse(map, PhysicsConfig::default()).unwrap()
    }

    fn hold(buttons: Buttons) -> ControllerFrame {
        ControllerFrame::only(buttons)
    }

    #[test]
    fn test_default_course_parses() {
        let course = course(DEFAULT_COURSE);
        assert_eq!(course.width(), 40);
        assert_eq!(course.height(), 16);
        // Three numbered targets and the goal
        assert_eq!(course.targets().len(), 4);
        assert_eq!(course.spawn(), tile_center(1, 13));
    }

    #[test]
    fn test_parse_rejects_bad_maps() {
        assert!(Course::parse("", PhysicsConfig::default()).is_err());
        assert!(Course::parse("#S#\n##", PhysicsConfig::default()).is_err());
        assert!(Course::parse("#..#\n####", PhysicsConfig::default()).is_err());
        assert!(Course::parse("#SX#\n####", PhysicsConfig::default()).is_err());
    }

    #[test]
    fn test_player_rests_on_ground() {
        let mut course = course(FLAT);
        for _ in 0..30 {
            course.step(&ControllerFrame::neutral());
        }
        assert_eq!(course.player_position(), course.spawn());
        assert!(course.snapshot(5, 5).unwrap().senses().on_ground);
    }

    #[test]
    fn test_running_right_moves_right() {
        let mut course = course(FLAT);
        let right = ControllerFrame {
            move_x: 1.0,
            ..ControllerFrame::neutral()
        };
        for _ in 0..10 {
            course.step(&right);
        }
        assert!(course.player_position().x > course.spawn().x);
    }

    #[test]
    fn test_jump_leaves_ground() {
        let mut course = course(FLAT);
        course.step(&ControllerFrame::neutral());
        course.step(&hold(Buttons::JUMP));
        assert!(course.player_position().y < course.spawn().y);
    }

    #[test]
    fn test_vision_centered_on_player() {
        let course = course(FLAT);
        let snapshot = course.snapshot(3, 3).unwrap();
        // Spawn is at (1, 3): left wall, floor below
        assert_eq!(snapshot.cell(0, 1), Some(1.0));
        assert_eq!(snapshot.cell(1, 1), Some(0.0));
        assert_eq!(snapshot.cell(1, 2), Some(1.0));
    }

    #[test]
    fn test_outside_map_reads_as_solid() {
        let course = course(FLAT);
        assert_eq!(course.tile(IVec2::new(-1, 0)), Tile::Solid);
        assert_eq!(course.tile(IVec2::new(0, -1)), Tile::Solid);
        assert_eq!(course.tile(IVec2::new(0, 99)), Tile::Empty);
    }

    #[test]
    fn test_spikes_kill_and_respawn() {
        let map = "\
#####
#S.G#
#...#
#^^^#
#####";
        let physics = PhysicsConfig {
            respawn_frames: 3,
            ..PhysicsConfig::default()
        };
        let mut course = Course::parse(map, physics).unwrap();
        let mut frames = 0;
        while !course.is_dead() && frames < 120 {
            course.step(&ControllerFrame::neutral());
            frames += 1;
        }
        assert!(course.is_dead());
        assert!(course.status().is_dead);
        assert_eq!(course.stats().deaths, 1);

        for _ in 0..3 {
            course.step(&ControllerFrame::neutral());
        }
        assert!(!course.is_dead());
        assert_eq!(course.player_position(), course.spawn());
    }

    #[test]
    fn test_cutscene_skipped_by_menu_sequence() {
        let mut course = course(FLAT);
        let right = ControllerFrame {
            move_x: 1.0,
            ..ControllerFrame::neutral()
        };
        let mut frames = 0;
        while course.status().cutscene != CutsceneStatus::InCutscene && frames < 120 {
            course.step(&right);
            frames += 1;
        }
        assert_eq!(course.stats().cutscenes_started, 1);

        course.step(&hold(Buttons::ESCAPE));
        course.step(&hold(Buttons::MENU_DOWN));
        assert!(course.status().cutscene.is_active());
        course.step(&hold(Buttons::MENU_CONFIRM));
        assert_eq!(course.status().cutscene, CutsceneStatus::NotInCutscene);
        assert_eq!(course.stats().cutscenes_skipped, 1);
    }

    #[test]
    fn test_cutscene_ends_on_its_own() {
        let physics = PhysicsConfig {
            cutscene_frames: 5,
            ..PhysicsConfig::default()
        };
        let mut course = Course::parse(FLAT, physics).unwrap();
        course.mode = Mode::Cutscene {
            remaining: 5,
            menu: None,
        };
        for _ in 0..5 {
            course.step(&ControllerFrame::neutral());
        }
        assert_eq!(course.status().cutscene, CutsceneStatus::NotInCutscene);
        assert_eq!(course.stats().cutscenes_skipped, 0);
    }

    #[test]
    fn test_quick_restart_needs_confirmation() {
        let mut course = course(FLAT);
        let right = ControllerFrame {
            move_x: 1.0,
            ..ControllerFrame::neutral()
        };
        for _ in 0..5 {
            course.step(&right);
        }
        course.step(&hold(Buttons::QUICK_RESTART));
        assert!(course.status().quick_restart_pending);
        assert_ne!(course.player_position(), course.spawn());

        course.step(&hold(Buttons::MENU_CONFIRM));
        assert!(!course.status().quick_restart_pending);
        assert_eq!(course.player_position(), course.spawn());
        assert_eq!(course.stats().restarts, 1);
    }
}
