#![allow(dead_code)]

pub mod diag_env;
pub mod mat;
