pub mod enrollment;
pub mod entries;
pub mod logs;
pub mod status;
