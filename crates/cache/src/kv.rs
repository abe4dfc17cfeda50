//! Single shared KV client per process (§5).
//!
//! Wraps `redis::aio::ConnectionManager`, which already reconnects
//! transparently on a dropped connection; `Kv::connect` is the only place
//! in this crate that opens a TCP connection.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use relay_domain::{Error, Result};

#[derive(Clone)]
pub struct Kv {
    conn: ConnectionManager,
}

impl Kv {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| Error::Other(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::Other(format!("redis connect: {e}")))?;
        Ok(Self { conn })
    }

    pub fn raw(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::Other(format!("redis GET {key}: {e}")))
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| Error::Other(format!("redis SETEX {key}: {e}")))?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| Error::Other(format!("redis DEL {key}: {e}")))?;
        Ok(())
    }

    /// `SET key value NX EX ttl`; returns `true` if the key was set (lock
    /// acquired), `false` if it already existed.
    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Other(format!("redis SET NX EX {key}: {e}")))?;
        Ok(result.is_some())
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| Error::Other(format!("redis PUBLISH {channel}: {e}")))?;
        Ok(())
    }
}
