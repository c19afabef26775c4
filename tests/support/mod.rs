#![allow(dead_code)]

pub mod collab;

pub use collab::{CollectDiagnostics, MemoryCollaborators};
