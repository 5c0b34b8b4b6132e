// src/models/mod.rs

pub mod catalog;
pub mod comment;
pub mod enrollment;
pub mod live;
pub mod quiz;
pub mod user;
