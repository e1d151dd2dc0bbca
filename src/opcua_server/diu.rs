//! The DIU device: one object node under Objects with seven child variables.

use crate::error::{DiuError, Result};
use crate::simulator::state::DiuSnapshot;
use opcua::server::prelude::*;
use opcua::sync::RwLock;
use std::sync::Arc;

/// Child variables every DIU exposes, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiuField {
    DeviceId,
    LocalValue,
    RemoteValue,
    Correction,
    CalibrateSignal,
    CalibrateTime,
    Temperature,
}

impl DiuField {
    pub const ALL: [DiuField; 7] = [
        DiuField::DeviceId,
        DiuField::LocalValue,
        DiuField::RemoteValue,
        DiuField::Correction,
        DiuField::CalibrateSignal,
        DiuField::CalibrateTime,
        DiuField::Temperature,
    ];

    /// Browse and display name of the variable.
    pub fn label(self) -> &'static str {
        match self {
            DiuField::DeviceId => "DIU ID",
            DiuField::LocalValue => "Local Value",
            DiuField::RemoteValue => "Remote Value",
            DiuField::Correction => "Correction",
            DiuField::CalibrateSignal => "Calibrate Signal",
            DiuField::CalibrateTime => "Calibrate Time",
            DiuField::Temperature => "Temperature",
        }
    }

    /// Suffix of the variable's string node id, e.g. `DIU1.LocalValue`.
    pub fn key(self) -> &'static str {
        match self {
            DiuField::DeviceId => "DeviceId",
            DiuField::LocalValue => "LocalValue",
            DiuField::RemoteValue => "RemoteValue",
            DiuField::Correction => "Correction",
            DiuField::CalibrateSignal => "CalibrateSignal",
            DiuField::CalibrateTime => "CalibrateTime",
            DiuField::Temperature => "Temperature",
        }
    }

    fn data_type(self) -> DataTypeId {
        match self {
            DiuField::DeviceId | DiuField::LocalValue => DataTypeId::UInt32,
            _ => DataTypeId::Double,
        }
    }

    fn initial_value(self, id: u32) -> Variant {
        match self {
            DiuField::DeviceId => Variant::UInt32(id),
            DiuField::LocalValue => Variant::UInt32(8),
            DiuField::RemoteValue => Variant::Double(7.8),
            DiuField::Correction => Variant::Double(6.8),
            DiuField::CalibrateSignal => Variant::Double(5.8),
            DiuField::CalibrateTime => Variant::Double(4.8),
            DiuField::Temperature => Variant::Double(3.8),
        }
    }
}

/// Payload accepted by [`Diu::trigger_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiuEvent {
    pub severity: u16,
    pub message: String,
}

/// Handle to a DIU's nodes in a server address space.
///
/// Cloning is cheap; clones refer to the same nodes.
#[derive(Clone)]
pub struct Diu {
    address_space: Arc<RwLock<AddressSpace>>,
    namespace: u16,
    id: u32,
    name: String,
    object_id: NodeId,
    variables: [NodeId; 7],
}

impl std::fmt::Debug for Diu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diu")
            .field("namespace", &self.namespace)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("object_id", &self.object_id)
            .finish()
    }
}

impl Diu {
    /// Create the `DIU<id>` object at node id `(namespace, id)` under the
    /// Objects folder, together with its child variables.
    pub fn new(address_space: Arc<RwLock<AddressSpace>>, namespace: u16, id: u32) -> Result<Self> {
        let name = format!("DIU{}", id);
        let object_id = NodeId::new(namespace, id);

        let variables = DiuField::ALL
            .map(|field| NodeId::new(namespace, format!("{}.{}", name, field.key())));

        {
            let mut space = address_space.write();

            let inserted = ObjectBuilder::new(
                &object_id,
                QualifiedName::new(namespace, name.as_str()),
                name.as_str(),
            )
            .organized_by(ObjectId::ObjectsFolder)
            .has_type_definition(ObjectTypeId::BaseObjectType)
            .event_notifier(EventNotifier::SUBSCRIBE_TO_EVENTS)
            .insert(&mut space);
            if !inserted {
                return Err(DiuError::NodeExists(object_id.to_string()));
            }

            for (field, node_id) in DiuField::ALL.iter().zip(variables.iter()) {
                let inserted = VariableBuilder::new(
                    node_id,
                    QualifiedName::new(namespace, field.label()),
                    field.label(),
                )
                .data_type(field.data_type())
                .value(field.initial_value(id))
                .writable()
                .has_type_definition(VariableTypeId::BaseDataVariableType)
                .component_of(object_id.clone())
                .insert(&mut space);
                if !inserted {
                    return Err(DiuError::NodeExists(node_id.to_string()));
                }
            }
        }

        tracing::debug!("Created {} at {}", name, object_id);

        Ok(Self {
            address_space,
            namespace,
            id,
            name,
            object_id,
            variables,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    pub fn object_id(&self) -> &NodeId {
        &self.object_id
    }

    pub fn variable_id(&self, field: DiuField) -> &NodeId {
        // `variables` is laid out in `DiuField::ALL` order
        &self.variables[field as usize]
    }

    pub fn set_local_value(&self, value: u32) -> Result<()> {
        self.write(DiuField::LocalValue, Variant::UInt32(value))
    }

    pub fn set_remote_value(&self, value: f64) -> Result<()> {
        self.write(DiuField::RemoteValue, Variant::Double(value))
    }

    /// Accepted for interface completeness; DIUs do not raise events yet.
    pub fn trigger_event(&self, event: &DiuEvent) {
        tracing::trace!(
            "{} ignoring event (severity {}): {}",
            self.name,
            event.severity,
            event.message
        );
    }

    /// Calibration is not implemented by the device; the call changes nothing.
    pub fn calibrate(&self) {
        tracing::trace!("{} calibration requested", self.name);
    }

    /// Current value of one of the child variables.
    pub fn read(&self, field: DiuField) -> Option<Variant> {
        let space = self.address_space.read();
        let variable = space.find_variable(self.variable_id(field))?;
        variable
            .value(
                TimestampsToReturn::Neither,
                NumericRange::None,
                &QualifiedName::null(),
                0.0,
            )
            .value
    }

    pub fn snapshot(&self) -> DiuSnapshot {
        DiuSnapshot {
            id: self.id,
            name: self.name.clone(),
            device_id: self.read_u32(DiuField::DeviceId),
            local_value: self.read_u32(DiuField::LocalValue),
            remote_value: self.read_f64(DiuField::RemoteValue),
            correction: self.read_f64(DiuField::Correction),
            calibrate_signal: self.read_f64(DiuField::CalibrateSignal),
            calibrate_time: self.read_f64(DiuField::CalibrateTime),
            temperature: self.read_f64(DiuField::Temperature),
        }
    }

    fn write(&self, field: DiuField, value: Variant) -> Result<()> {
        let node_id = self.variable_id(field);
        let now = DateTime::now();
        let mut space = self.address_space.write();
        if space.set_variable_value(node_id.clone(), value, &now, &now) {
            Ok(())
        } else {
            Err(DiuError::NodeNotFound(node_id.to_string()))
        }
    }

    fn read_u32(&self, field: DiuField) -> u32 {
        match self.read(field) {
            Some(Variant::UInt32(v)) => v,
            _ => 0,
        }
    }

    fn read_f64(&self, field: DiuField) -> f64 {
        match self.read(field) {
            Some(Variant::Double(v)) => v,
            Some(Variant::Float(v)) => f64::from(v),
            _ => 0.0,
        }
    }
}
