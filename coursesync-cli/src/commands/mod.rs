pub mod init;
pub mod map;
pub mod status;
pub mod sync;
