//! Concrete collaborators for the conversation core: audio session, console
//! capture, HTTP chat streaming and the speech output engines.

pub mod audio_session;
pub mod capture;
pub mod chat;
pub mod speech;
