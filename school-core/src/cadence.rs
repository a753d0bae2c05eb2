/// Rotating neighbour-scan schedule shared by every school in a frame.
///
/// Each fish only looks at every `stride`-th school mate, starting at
/// `offset`. The offset rotates every frame so that every pair is visited
/// once every `stride` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborCadence {
    offset: u32,
    complexity: u32,
}

impl NeighborCadence {
    pub const MIN_COMPLEXITY: u32 = 1;
    pub const MAX_COMPLEXITY: u32 = 5;

    /// `complexity` is clamped to 1..=5; 5 scans every neighbour each frame
    pub fn new(complexity: u32) -> Self {
        Self {
            offset: 0,
            complexity: complexity.clamp(Self::MIN_COMPLEXITY, Self::MAX_COMPLEXITY),
        }
    }

    pub fn complexity(&self) -> u32 {
        self.complexity
    }

    pub fn set_complexity(&mut self, complexity: u32) {
        self.complexity = complexity.clamp(Self::MIN_COMPLEXITY, Self::MAX_COMPLEXITY);
        self.offset %= self.stride();
    }

    pub fn stride(&self) -> u32 {
        6 - self.complexity
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Move on to the next frame's starting offset
    pub fn advance(&mut self) {
        self.offset = (self.offset + 1) % self.stride();
    }

    /// First neighbour index to scan in a school of `active` fish
    pub fn start_index(&self, active: usize) -> usize {
        if active == 0 {
            0
        } else {
            self.offset as usize % active
        }
    }
}

impl Default for NeighborCadence {
    fn default() -> Self {
        Self::new(Self::MIN_COMPLEXITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_from_complexity() {
        assert_eq!(NeighborCadence::new(1).stride(), 5);
        assert_eq!(NeighborCadence::new(5).stride(), 1);
        assert_eq!(NeighborCadence::new(0).complexity(), 1);
        assert_eq!(NeighborCadence::new(9).complexity(), 5);
    }

    #[test]
    fn test_offset_rotates() {
        let mut cadence = NeighborCadence::new(3);
        let offsets: Vec<u32> = (0..6)
            .map(|_| {
                cadence.advance();
                cadence.offset()
            })
            .collect();
        assert_eq!(offsets, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_start_index_wraps_small_schools() {
        let mut cadence = NeighborCadence::new(1);
        for _ in 0..4 {
            cadence.advance();
        }
        assert_eq!(cadence.offset(), 4);
        assert_eq!(cadence.start_index(3), 1);
        assert_eq!(cadence.start_index(1), 0);
        assert_eq!(cadence.start_index(0), 0);
    }
}
