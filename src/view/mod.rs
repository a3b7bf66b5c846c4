pub mod gate;
pub mod room;
pub mod sign_in;
