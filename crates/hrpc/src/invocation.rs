//! # Invocation
//!
//! A method name plus its parameter list, as carried in a request frame.

use hwire::Decoder;
use hwire::Encoder;
use hwire::Value;

use crate::error::Result;

/// One remote method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub params: Vec<Value>,
}

impl Invocation {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self { method: method.into(), params }
    }

    /// `[method: text][count: i32][param: value]*`
    pub fn write(&self, out: &mut Encoder) -> Result<()> {
        out.text(&self.method)?;
        out.count(self.params.len())?;
        for param in &self.params {
            out.value(param)?;
        }
        Ok(())
    }

    /// Reads an invocation back. Only peers (and tests standing in for them) need this.
    pub fn read(dec: &mut Decoder) -> Result<Self> {
        let method = dec.text()?.to_string();
        let n = dec.count()?;
        let mut params = Vec::with_capacity(n.min(dec.remaining()));
        for _ in 0..n {
            params.push(dec.value()?);
        }
        Ok(Self { method, params })
    }
}
