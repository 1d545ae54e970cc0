//! Per-node application: serves one device model.

use tracing::{debug, instrument};

use crate::model::DeviceModel;
use crate::network::Address;
use crate::service::{IAm, ReadAck, Request, RequestError, Response};

/// The application running on one replay node.
///
/// Answers ReadProperty and WriteProperty from its own [`DeviceModel`] and
/// takes part in Who-Is / I-Am discovery.
#[derive(Debug)]
pub struct DeviceApplication {
    address: Address,
    model: DeviceModel,
}

impl DeviceApplication {
    /// `address` is where the router sees this node.
    pub const fn new(address: Address, model: DeviceModel) -> Self {
        Self { address, model }
    }

    pub const fn address(&self) -> &Address {
        &self.address
    }

    pub const fn model(&self) -> &DeviceModel {
        &self.model
    }

    pub const fn device_id(&self) -> u32 {
        self.model.device_id()
    }

    pub fn object_name(&self) -> &str {
        self.model.device().object_name()
    }

    /// Execute a confirmed request addressed to this node.
    #[instrument(skip_all, fields(device_id = self.model.device_id(), service = request.service()))]
    pub fn confirmation(&mut self, request: &Request) -> Result<Response, RequestError> {
        let result = match request {
            Request::ReadProperty {
                object,
                property,
                index,
                ..
            } => self
                .model
                .read_property(object, property, *index)
                .map(|value| {
                    Response::ReadAck(ReadAck {
                        object: *object,
                        property: property.clone(),
                        index: *index,
                        value,
                    })
                }),
            Request::WriteProperty {
                object,
                property,
                value,
                index,
                priority,
                ..
            } => self
                .model
                .write_property(object, property, value.clone(), *index, *priority)
                .map(|()| Response::Ack),
            Request::WhoIs { .. } | Request::IAm { .. } => Err(RequestError::Malformed(format!(
                "{} is not a confirmed service",
                request.service()
            ))),
        };

        match &result {
            Ok(_) => debug!("Request served"),
            Err(e) => debug!(error = %e, "Request refused"),
        }
        result
    }

    /// The I-Am this node answers with if `range` covers it.
    pub fn who_is(&self, range: Option<(u32, u32)>) -> Option<IAm> {
        self.model
            .matches_who_is(range)
            .then(|| self.model.i_am(self.address))
    }

    pub fn i_am(&self) -> IAm {
        self.model.i_am(self.address)
    }
}
