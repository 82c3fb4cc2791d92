use crate::attributes::Attributes;
use crate::error::BackendError;
use super::{BackendAdapter, BackendKind, Interfaces, RawEvent, Wait};

/// Stand-in bound when no zeroconf provider is reachable
#[derive(Debug, Default)]
pub struct UnavailableAdapter;

impl BackendAdapter for UnavailableAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Unavailable
    }

    fn advertise(&mut self, _port: u16, _instance_name: &str, _attributes: &Attributes) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }

    fn unadvertise(&mut self) {}

    fn start_browse(&mut self, _scope: Interfaces) -> Result<(), BackendError> {
        Err(BackendError::NotSupported)
    }

    fn stop_browse(&mut self) {}

    fn pump_events(&mut self, _wait: Wait) -> Result<Vec<RawEvent>, BackendError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_not_supported() {
        let mut adapter = UnavailableAdapter;
        assert!(matches!(
            adapter.advertise(4000, "node", &Attributes::new()),
            Err(BackendError::NotSupported)
        ));
        assert!(matches!(
            adapter.start_browse(Interfaces::All),
            Err(BackendError::NotSupported)
        ));
        assert!(adapter.pump_events(Wait::UntilEvent).unwrap().is_empty());
        adapter.unadvertise();
        adapter.stop_browse();
    }
}
