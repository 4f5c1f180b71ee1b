//! Use cases orchestrating ports around the chat service.

pub mod ask_chat;
