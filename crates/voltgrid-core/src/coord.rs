//! Block coordinates, face directions, and the regions the world loads in.

use serde::{Deserialize, Serialize};

/// Width of a loading region along X and Z, in blocks.
pub const REGION_SIZE: i32 = 16;

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// A position in the block world. The join key for grid nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The adjacent position across the given face.
    pub fn offset(self, dir: Direction) -> Self {
        let (dx, dy, dz) = dir.delta();
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// All six face-adjacent positions, paired with the face they lie across.
    pub fn neighbors(self) -> impl Iterator<Item = (Direction, BlockPos)> {
        Direction::ALL.into_iter().map(move |dir| (dir, self.offset(dir)))
    }

    /// The loading region containing this position.
    pub fn region(self) -> RegionPos {
        RegionPos {
            x: self.x.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &BlockPos) -> u32 {
        (self.x - other.x).unsigned_abs()
            + (self.y - other.y).unsigned_abs()
            + (self.z - other.z).unsigned_abs()
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// The six faces of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    /// All six faces, in neighbor-scan order.
    pub const ALL: [Direction; 6] = [
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Offset for this direction.
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
        }
    }

    /// The face pointing the other way.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }
}

// ---------------------------------------------------------------------------
// RegionPos
// ---------------------------------------------------------------------------

/// A column of blocks that the host world loads and unloads as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Whether the block position falls inside this region.
    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.region() == *self
    }
}
