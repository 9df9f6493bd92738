//! Types and pure logic shared by the SteriTrack service and its browser client.

pub mod extract;
pub mod model;
pub mod requests;
pub mod status;
