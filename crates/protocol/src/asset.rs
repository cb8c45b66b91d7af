use serde::{Deserialize, Serialize};

/// Metadata envelope for one cross-device asset transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetObj {
    pub session_id: String,
    pub dst_network_id: String,
    pub src_bundle_name: String,
    pub dst_bundle_name: String,
    /// Receiver-visible result URIs, in arrival order.
    #[serde(default)]
    pub uris: Vec<String>,
}

impl AssetObj {
    /// Key of the send callback owning this transfer.
    pub fn task_id(&self) -> String {
        format!("{}{}", self.src_bundle_name, self.session_id)
    }
}

/// Result code delivered to asset callbacks.
///
/// Numeric because listeners live in other processes in a real deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    BadValue = 13_900_020,
    EventHandler = 13_900_042,
    Transport = 13_900_044,
    Cancelled = 13_900_048,
}

impl ResultCode {
    /// Returns the wire value.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl From<ResultCode> for i32 {
    fn from(value: ResultCode) -> Self {
        value.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_concatenates_bundle_and_session() {
        let asset = AssetObj {
            session_id: "42".into(),
            src_bundle_name: "com.demo.a".into(),
            ..Default::default()
        };
        assert_eq!(asset.task_id(), "com.demo.a42");
    }

    #[test]
    fn asset_obj_uses_camel_case_on_the_wire() {
        let asset = AssetObj {
            session_id: "7".into(),
            dst_network_id: "net".into(),
            src_bundle_name: "a".into(),
            dst_bundle_name: "b".into(),
            uris: vec!["file://b/x".into()],
        };
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["sessionId"], "7");
        assert_eq!(json["dstNetworkId"], "net");
        assert_eq!(json["uris"][0], "file://b/x");

        let back: AssetObj = serde_json::from_value(json).unwrap();
        assert_eq!(back, asset);
    }

    #[test]
    fn missing_uris_default_to_empty() {
        let json = r#"{"sessionId":"1","dstNetworkId":"","srcBundleName":"a","dstBundleName":"b"}"#;
        let asset: AssetObj = serde_json::from_str(json).unwrap();
        assert!(asset.uris.is_empty());
    }

    #[test]
    fn result_codes() {
        assert_eq!(ResultCode::Ok.code(), 0);
        assert!(ResultCode::Ok.is_ok());
        assert!(!ResultCode::BadValue.is_ok());
        assert_eq!(i32::from(ResultCode::EventHandler), 13_900_042);
    }
}
