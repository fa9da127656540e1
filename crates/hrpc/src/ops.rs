//! # Region Operations
//!
//! Typed shortcuts over [`Connection::invoke`]. Each one shapes a parameter
//! list and unpacks the single value the server returns.

use hwire::Get;
use hwire::Put;
use hwire::RowResult;
use hwire::Value;

use crate::connection::Connection;
use crate::error::Error;
use crate::error::Result;

fn unexpected(method: &str, expected: &str, got: &Value) -> Error {
    Error::Protocol(format!("{} returned {:?}, expected {}", method, got.type_code(), expected))
}

impl Connection {
    /// Asks the server which version of `protocol` it speaks.
    pub async fn get_protocol_version(&self, protocol: &str, client_version: i64) -> Result<i64> {
        const METHOD: &str = "getProtocolVersion";
        let params = vec![Value::from(protocol), Value::Long(client_version)];
        let reply = self.invoke(METHOD, params).await?;
        reply.as_long().ok_or_else(|| unexpected(METHOD, "long", &reply))
    }

    /// Reads one row. A null reply is an empty row.
    pub async fn get(&self, region: &[u8], get: Get) -> Result<RowResult> {
        const METHOD: &str = "get";
        let params = vec![Value::Bytes(region.to_vec()), Value::Get(get)];
        match self.invoke(METHOD, params).await? {
            Value::RowResult(row) => Ok(row),
            Value::Null => Ok(RowResult::default()),
            other => Err(unexpected(METHOD, "row result", &other)),
        }
    }

    /// Writes the cells of one row.
    pub async fn put(&self, region: &[u8], put: Put) -> Result<()> {
        const METHOD: &str = "put";
        let params = vec![Value::Bytes(region.to_vec()), Value::Put(put)];
        match self.invoke(METHOD, params).await? {
            Value::Null => Ok(()),
            other => Err(unexpected(METHOD, "null", &other)),
        }
    }

    /// Whether the row addressed by `get` has any cells.
    pub async fn exists(&self, region: &[u8], get: Get) -> Result<bool> {
        const METHOD: &str = "exists";
        let params = vec![Value::Bytes(region.to_vec()), Value::Get(get)];
        let reply = self.invoke(METHOD, params).await?;
        reply.as_bool().ok_or_else(|| unexpected(METHOD, "bool", &reply))
    }
}
