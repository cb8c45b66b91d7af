use std::collections::HashMap;
use std::sync::Mutex;

/// How a peer device is bound to this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthForm {
    IdenticalAccount,
    AcrossAccount,
    PeerToPeer,
}

/// Answers whether a peer may exchange assets with this device.
pub trait TrustedDevices: Send + Sync {
    fn is_same_account(&self, network_id: &str) -> bool;
}

/// In-memory trusted-device list.
#[derive(Debug, Default)]
pub struct StaticTrustList {
    devices: Mutex<HashMap<String, AuthForm>>,
}

impl StaticTrustList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, network_id: impl Into<String>, form: AuthForm) {
        self.devices.lock().unwrap().insert(network_id.into(), form);
    }

    pub fn remove(&self, network_id: &str) -> Option<AuthForm> {
        self.devices.lock().unwrap().remove(network_id)
    }
}

impl TrustedDevices for StaticTrustList {
    fn is_same_account(&self, network_id: &str) -> bool {
        self.devices.lock().unwrap().get(network_id) == Some(&AuthForm::IdenticalAccount)
    }
}
