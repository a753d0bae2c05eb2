use crate::vector::Vector3;

/// Per-school linear congruential generator.
///
/// Each school carries its own generator so that a school's evolution only
/// depends on its own seed, never on which worker thread happens to run it.
#[derive(Debug, Clone)]
pub struct SchoolRng {
    state: u32,
}

impl SchoolRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Generate next u32 value
    pub fn next_u32(&mut self) -> u32 {
        const A: u32 = 71359;
        const C: u32 = 468029;

        self.state = self.state.wrapping_mul(A).wrapping_add(C);
        self.state
    }

    /// Generate a float in range [0.0, 1.0]
    pub fn next_f32(&mut self) -> f32 {
        let value = self.next_u32();
        (value as f32) / (u32::MAX as f32)
    }

    /// Vector with every component in `[0, scale]`
    pub fn scaled_vector(&mut self, scale: f32) -> Vector3 {
        let x = self.next_f32() * scale;
        let y = self.next_f32() * scale;
        let z = self.next_f32() * scale;
        Vector3::new(x, y, z)
    }

    /// Vector with each component scaled independently
    pub fn scaled_vector3(&mut self, scale: Vector3) -> Vector3 {
        let x = self.next_f32() * scale.x;
        let y = self.next_f32() * scale.y;
        let z = self.next_f32() * scale.z;
        Vector3::new(x, y, z)
    }

    /// Uniform point inside the axis-aligned box `min..=max`
    pub fn in_box(&mut self, min: Vector3, max: Vector3) -> Vector3 {
        self.scaled_vector3(max - min) + min
    }
}
