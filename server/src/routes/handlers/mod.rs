pub mod chat;
pub mod home;
pub mod mood;
pub mod survey;
