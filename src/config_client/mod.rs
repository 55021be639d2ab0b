// SPDX-License-Identifier: AGPL-3.0-or-later

//! The XML-RPC configuration service ("ACI"): login, introspection and the
//! paged object filter protocol (spec §4.B–§4.C).

pub mod filter;
pub mod xmlrpc;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    cfg::config::SessionConfig,
    config_client::xmlrpc::Value,
    error::{Error, Result},
    transport::{
        TlsStream,
        xml_framing::{FrameReader, FrameWriter},
    },
};

/// A description of one introspected object type, as returned by
/// `IIntrospection.GetTypes`.
#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub version: Option<String>,
}

/// A connection to the configuration service.
///
/// Requests are strictly request/response (one frame out, one frame back)
/// with no multiplexing, so callers serialize through the internal mutex
/// the same way the command client serializes line writes.
pub struct ConfigClient {
    reader: Mutex<FrameReader<tokio::io::ReadHalf<TlsStream>>>,
    writer: Mutex<FrameWriter<tokio::io::WriteHalf<TlsStream>>>,
    logged_in: Mutex<bool>,
}

impl ConfigClient {
    pub async fn connect(cfg: &SessionConfig) -> Result<Arc<Self>> {
        let stream = crate::transport::dial(
            &cfg.host,
            cfg.config_port(),
            cfg.tls.transport,
            cfg.tls.verify,
            cfg.timeouts.connect,
        )
        .await?;
        let (r, w) = tokio::io::split(stream);

        let client = Arc::new(Self {
            reader: Mutex::new(FrameReader::new(r)),
            writer: Mutex::new(FrameWriter::new(w)),
            logged_in: Mutex::new(false),
        });

        if let Some(creds) = &cfg.credentials {
            client.login(&creds.username, &creds.password).await?;
        }

        Ok(client)
    }

    /// Sends a method call for `"Interface.Method"` and waits for the
    /// matching `<return>` frame, validating that its outer tags echo the
    /// request's (spec §4.B, §6).
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let (interface, method) = split_method(method)?;
        let frame = xmlrpc::encode_call(interface, method, params);
        {
            let mut w = self.writer.lock().await;
            w.write_frame(&frame).await?;
        }
        debug!("sent config call {interface}.{method}");

        let response = {
            let mut r = self.reader.lock().await;
            r.read_frame().await?.ok_or(Error::Disconnected)?
        };
        xmlrpc::decode_return(&response, interface, method)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let params = [Value::String(username.to_string()), Value::String(password.to_string())];
        let ok = self.call("ILogin.Login", &params).await?.as_bool().unwrap_or(false);
        if !ok {
            return Err(Error::Auth);
        }
        *self.logged_in.lock().await = true;
        Ok(())
    }

    pub async fn is_logged_in(&self) -> bool {
        *self.logged_in.lock().await
    }

    pub async fn get_version(&self) -> Result<String> {
        let v = self.call("IIntrospection.GetVersion", &[]).await?;
        v.member("rVersion")
            .or(Some(&v))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::decode("GetVersion response missing version string"))
    }

    pub async fn get_types(&self) -> Result<Vec<ObjectType>> {
        let v = self.call("IIntrospection.GetTypes", &[]).await?;
        let items = v.as_array().ok_or_else(|| Error::decode("GetTypes response is not an array"))?;
        Ok(items
            .iter()
            .filter_map(|t| {
                let name = t.member("Name").and_then(Value::as_str)?.to_string();
                let version = t.member("Version").and_then(Value::as_str).map(ToString::to_string);
                Some(ObjectType { name, version })
            })
            .collect())
    }

    /// Direct lookup of specific VIDs without opening a paged filter
    /// (spec §4.C.2).
    pub async fn get_object(&self, vids: &[i64]) -> Result<Vec<Value>> {
        let params = [Value::Array(vids.iter().map(|v| Value::Int(*v)).collect())];
        let v = self.call("IConfiguration.GetObject", &params).await?;
        Ok(v.as_array().map(<[Value]>::to_vec).unwrap_or_default())
    }
}

/// Splits an `"Interface.Method"` string into its two tag names for the
/// bit-exact `<Interface><Method>` framing (spec §6).
fn split_method(method: &str) -> Result<(&str, &str)> {
    method
        .split_once('.')
        .ok_or_else(|| Error::decode(format!("method '{method}' is not in 'Interface.Method' form")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_interface_and_method() {
        assert_eq!(split_method("IIntrospection.GetVersion").unwrap(), ("IIntrospection", "GetVersion"));
    }

    #[test]
    fn rejects_a_method_without_an_interface_prefix() {
        assert!(split_method("GetVersion").is_err());
    }
}
