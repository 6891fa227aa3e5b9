pub mod audio;
pub mod files;
pub mod meetings;
pub mod users;
