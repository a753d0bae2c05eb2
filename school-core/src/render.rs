use alloc::vec::Vec;

/// One instanced draw of a school mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub school: usize,
    pub mesh: u32,
    /// Ring slot holding the instance data
    pub ring_slot: usize,
    /// Byte offset of that slot in the instance buffer
    pub byte_offset: usize,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Sink for draw commands; implemented by whatever records GPU work
pub trait DrawRecorder {
    fn draw_instanced(&mut self, command: DrawCommand);
}

/// Plain list of recorded draws, one per worker thread
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<DrawCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl DrawRecorder for CommandList {
    fn draw_instanced(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}

/// Split `count` instances into `(first, count)` batches of `batch_size`.
///
/// A batch size of zero, or one larger than `count`, yields a single batch.
pub fn batches(count: u32, batch_size: u32) -> impl Iterator<Item = (u32, u32)> {
    let size = if batch_size == 0 || batch_size > count {
        count
    } else {
        batch_size
    };
    let num = if size == 0 { 0 } else { count.div_ceil(size) };
    (0..num).map(move |i| {
        let first = i * size;
        (first, size.min(count - first))
    })
}
