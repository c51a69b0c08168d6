//! Routing key construction
//!
//! Client requests select broker traffic with five hierarchical fields. They
//! are joined into a topic routing key of the form
//! `method.resource.resourceID.contextType.contextID`.

use crate::message::InboundMessage;

/// Token substituted for absent or empty selector fields
pub const WILDCARD: &str = "*";

/// Build the routing key for a client request.
///
/// Missing and empty fields become [`WILDCARD`]; present fields are used
/// verbatim, without validation.
pub fn routing_key(message: &InboundMessage) -> String {
    let fields = [
        message.method.as_deref(),
        message.resource.as_deref(),
        message.resource_id.as_deref(),
        message.context_type.as_deref(),
        message.context_id.as_deref(),
    ];

    fields
        .iter()
        .map(|field| match field {
            Some(value) if !value.is_empty() => *value,
            _ => WILDCARD,
        })
        .collect::<Vec<_>>()
        .join(".")
}
