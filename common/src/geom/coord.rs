use serde::{Deserialize, Serialize};

/// A quantized board location. Signed because the board origin is arbitrary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Search vertex: a grid cell on a specific routing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridState {
    pub x: i32,
    pub y: i32,
    pub layer: u8,
}

impl GridState {
    pub fn new(x: i32, y: i32, layer: u8) -> Self {
        Self { x, y, layer }
    }

    pub fn cell(&self) -> GridPoint {
        GridPoint::new(self.x, self.y)
    }

    /// Pack into a u64 hash key: 20 bits x, 20 bits y, 8 bits layer.
    /// Coordinates must fit in [-524288, 524287].
    #[inline]
    pub fn key(&self) -> u64 {
        let x = (self.x as u64) & 0xFFFFF;
        let y = (self.y as u64) & 0xFFFFF;
        (x << 28) | (y << 8) | self.layer as u64
    }

    /// Inverse of `key`, with sign extension for negative coordinates.
    #[inline]
    pub fn from_key(key: u64) -> Self {
        let layer = (key & 0xFF) as u8;
        let y = sign_extend_20(((key >> 8) & 0xFFFFF) as i32);
        let x = sign_extend_20(((key >> 28) & 0xFFFFF) as i32);
        Self { x, y, layer }
    }
}

/// Pack a bare (x, y) cell into a u64 hash key (layer-independent sets).
#[inline]
pub fn cell_key(x: i32, y: i32) -> u64 {
    let xm = (x as u64) & 0xFFFFFFFF;
    let ym = (y as u64) & 0xFFFFFFFF;
    (xm << 32) | ym
}

#[inline]
fn sign_extend_20(v: i32) -> i32 {
    if v & 0x80000 != 0 { v | !0xFFFFF } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_preserves_negative_coordinates() {
        let s = GridState::new(-173, -9, 3);
        assert_eq!(GridState::from_key(s.key()), s);
        let t = GridState::new(524287, -524288, 0);
        assert_eq!(GridState::from_key(t.key()), t);
    }
}
