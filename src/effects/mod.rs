pub mod time;
pub mod utility;
