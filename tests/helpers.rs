#![allow(dead_code)]

pub type Anyhow = anyhow::Result<()>;
