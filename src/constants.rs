// Pool capacity defaults
pub const DEFAULT_VERTEX_CAPACITY: u32 = 262_144;
pub const DEFAULT_INDEX_CAPACITY: u32 = 393_216;
pub const MAX_PARTS_PER_POOL: usize = 512;

// Packing tuning knobs
pub const MAX_ORIGIN_DISTANCE: f64 = 5000.0;
pub const FRAGMENTATION_THRESHOLD: f32 = 0.03;

// Recycler
pub const RECYCLE_TOLERANCE: f32 = 0.2;
pub const RECYCLER_MAX_RETAINED: usize = 256;

// Shader uniform names
pub const ORIGIN_UNIFORM: &str = "origin";
pub const MODEL_VIEW_UNIFORM: &str = "modelViewMatrix";

// Bytes charged per index slot when pools keep a dedicated index buffer
pub const INDEX_BYTES: u64 = 4;

pub const SETTINGS_FILE: &str = "meshpool.bin";
