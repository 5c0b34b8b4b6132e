// src/handlers/mod.rs

pub mod attempt;
pub mod auth;
pub mod catalog;
pub mod comment;
pub mod enrollment;
pub mod live;
pub mod notification;
pub mod profile;
pub mod quiz;
pub mod upload;
