use anyhow::Context;
use std::{fs, path::Path};

pub fn read_to_string<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
    fs::read_to_string(&p).with_context(|| format!("read file {:?}", p.as_ref()))
}

/// Template files often end with a newline the author did not mean to send.
pub fn read_template<P: AsRef<Path>>(p: P) -> anyhow::Result<String> {
    Ok(read_to_string(p)?.trim_end_matches(['\r', '\n']).to_string())
}
