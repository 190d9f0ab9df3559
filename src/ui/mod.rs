//! Chat presentation: plain-text notices and embeds.

pub mod embeds;
pub mod notices;
