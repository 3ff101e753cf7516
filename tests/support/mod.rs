#![allow(dead_code)]

pub mod probe_server;
pub mod socket_guard;
