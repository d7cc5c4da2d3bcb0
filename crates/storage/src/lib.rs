#![forbid(unsafe_code)]

pub mod keys;
pub mod ledger_codec;
pub mod lesson_codec;
pub mod repository;
pub mod sqlite;
