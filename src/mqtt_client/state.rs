// SPDX-License-Identifier: MPL-2.0

//! Publish delivery state tracking for QoS 1 and QoS 2 exchanges.
//!
//! Every in-flight publish — ours or the broker's — owns one record in a
//! fixed slot table, keyed by `(packet_id, originator)`. Records advance
//! along the acknowledgement lattice below and are destroyed on reaching
//! [`PublishState::PublishDone`]:
//!
//! ```text
//! out QoS1: PublishSend -> PubAckPending -> (recv PUBACK)  -> PublishDone
//! out QoS2: PublishSend -> PubRecPending -> (recv PUBREC)  -> PubRelSend
//!               -> (send PUBREL) -> PubCompPending -> (recv PUBCOMP) -> PublishDone
//! in  QoS1: (recv PUBLISH) -> PubAckSend -> (send PUBACK)  -> PublishDone
//! in  QoS2: (recv PUBLISH) -> PubRecSend -> (send PUBREC)  -> PubRelPending
//!               -> (recv PUBREL) -> PubCompSend -> (send PUBCOMP) -> PublishDone
//! ```
//!
//! The table is walked linearly; [`MAX_INFLIGHT_RECORDS`] is small enough
//! that this beats any index structure on the targets this crate serves.

use serde::Serialize;

use super::error::MqttClientError;
use crate::mqtt_serde::control_packet::ControlPacketType;
use crate::mqtt_serde::QoS;

/// Upper bound on concurrently in-flight QoS >= 1 exchanges, outbound and
/// inbound combined.
pub const MAX_INFLIGHT_RECORDS: usize = 10;

/// Which side created a publish exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operation {
    Send,
    Receive,
}

/// Position of a publish exchange in its acknowledgement sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishState {
    Invalid,
    PublishSend,
    PubAckPending,
    PubRecPending,
    PubRelPending,
    PubCompPending,
    PubAckSend,
    PubRecSend,
    PubRelSend,
    PubCompSend,
    PublishDone,
    /// No valid next state exists for the presented event.
    StateNull,
}

/// State a publish enters after the PUBLISH packet itself is sent or
/// received.
pub fn calculate_state_publish(operation: Operation, qos: QoS) -> PublishState {
    match (operation, qos) {
        (_, QoS::AtMostOnce) => PublishState::PublishDone,
        (Operation::Send, QoS::AtLeastOnce) => PublishState::PubAckPending,
        (Operation::Send, QoS::ExactlyOnce) => PublishState::PubRecPending,
        (Operation::Receive, QoS::AtLeastOnce) => PublishState::PubAckSend,
        (Operation::Receive, QoS::ExactlyOnce) => PublishState::PubRecSend,
    }
}

/// State a publish enters after an acknowledgement packet is sent or
/// received. Returns [`PublishState::StateNull`] for packet types that are
/// not acknowledgements.
pub fn calculate_state_ack(ack_type: ControlPacketType, operation: Operation) -> PublishState {
    match (ack_type, operation) {
        (ControlPacketType::PUBACK, _) | (ControlPacketType::PUBCOMP, _) => {
            PublishState::PublishDone
        }
        (ControlPacketType::PUBREC, Operation::Receive) => PublishState::PubRelSend,
        (ControlPacketType::PUBREC, Operation::Send) => PublishState::PubRelPending,
        (ControlPacketType::PUBREL, Operation::Receive) => PublishState::PubCompSend,
        (ControlPacketType::PUBREL, Operation::Send) => PublishState::PubCompPending,
        _ => PublishState::StateNull,
    }
}

/// Which side's record an acknowledgement event applies to.
///
/// Receiving a PUBACK closes an exchange we originated; sending one closes
/// an exchange the broker originated. PUBREL runs the other way around.
fn ack_originator(ack_type: ControlPacketType, operation: Operation) -> Option<Operation> {
    match (ack_type, operation) {
        (ControlPacketType::PUBACK | ControlPacketType::PUBREC, Operation::Receive) => {
            Some(Operation::Send)
        }
        (ControlPacketType::PUBACK | ControlPacketType::PUBREC, Operation::Send) => {
            Some(Operation::Receive)
        }
        (ControlPacketType::PUBREL, op) => Some(op),
        (ControlPacketType::PUBCOMP, Operation::Receive) => Some(Operation::Send),
        (ControlPacketType::PUBCOMP, Operation::Send) => Some(Operation::Receive),
        _ => None,
    }
}

fn ack_transition_is_valid(current: PublishState, new: PublishState) -> bool {
    matches!(
        (current, new),
        (PublishState::PubAckPending, PublishState::PublishDone)
            | (PublishState::PubAckSend, PublishState::PublishDone)
            | (PublishState::PubRecPending, PublishState::PubRelSend)
            | (PublishState::PubRecSend, PublishState::PubRelPending)
            // Broker re-delivered a QoS 2 publish; PUBREC goes out again.
            | (PublishState::PubRelPending, PublishState::PubRelPending)
            | (PublishState::PubRelSend, PublishState::PubCompPending)
            | (PublishState::PubRelPending, PublishState::PubCompSend)
            // Broker re-sent PUBREL before our PUBCOMP got through.
            | (PublishState::PubCompSend, PublishState::PubCompSend)
            | (PublishState::PubCompPending, PublishState::PublishDone)
            | (PublishState::PubCompSend, PublishState::PublishDone)
    )
}

#[derive(Debug, Clone, Copy)]
struct PublishRecord {
    packet_id: u16,
    qos: QoS,
    state: PublishState,
    originator: Operation,
}

/// Fixed-capacity table of in-flight publish records.
pub struct PublishTracker {
    slots: [Option<PublishRecord>; MAX_INFLIGHT_RECORDS],
}

impl Default for PublishTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishTracker {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_INFLIGHT_RECORDS],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn contains(&self, packet_id: u16, originator: Operation) -> bool {
        self.find(packet_id, originator).is_some()
    }

    pub fn state_of(&self, packet_id: u16, originator: Operation) -> Option<PublishState> {
        self.find(packet_id, originator)
            .map(|i| self.slots[i].as_ref().unwrap().state)
    }

    fn find(&self, packet_id: u16, originator: Operation) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|r| r.packet_id == packet_id && r.originator == originator)
        })
    }

    fn insert(&mut self, record: PublishRecord) -> Result<(), MqttClientError> {
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some(record);
                Ok(())
            }
            None => Err(MqttClientError::NoMemory {
                needed: MAX_INFLIGHT_RECORDS + 1,
                capacity: MAX_INFLIGHT_RECORDS,
            }),
        }
    }

    /// Create the record for an outbound QoS >= 1 publish before its bytes
    /// go out, so a publish that is sent but never acknowledged is still
    /// accounted for.
    pub fn reserve(&mut self, packet_id: u16, qos: QoS) -> Result<(), MqttClientError> {
        if packet_id == 0 {
            return Err(MqttClientError::BadParameter(
                "packet identifier must be non-zero",
            ));
        }
        if qos == QoS::AtMostOnce {
            return Err(MqttClientError::BadParameter(
                "QoS 0 publishes carry no delivery state",
            ));
        }
        if self.contains(packet_id, Operation::Send) {
            return Err(MqttClientError::BadParameter(
                "packet identifier already in flight",
            ));
        }
        self.insert(PublishRecord {
            packet_id,
            qos,
            state: PublishState::PublishSend,
            originator: Operation::Send,
        })
    }

    /// Drop a record without completing its exchange, e.g. when the send of
    /// the PUBLISH itself failed and the id will be reallocated.
    pub fn remove(&mut self, packet_id: u16, originator: Operation) -> bool {
        match self.find(packet_id, originator) {
            Some(i) => {
                self.slots[i] = None;
                true
            }
            None => false,
        }
    }

    /// Advance a record for a PUBLISH packet event.
    ///
    /// `Operation::Send` moves a reserved outbound record past its send.
    /// `Operation::Receive` creates the inbound record, or re-drives an
    /// existing one when the broker re-delivers (DUP) a QoS 2 publish.
    pub fn update_publish(
        &mut self,
        packet_id: u16,
        qos: QoS,
        operation: Operation,
    ) -> Result<PublishState, MqttClientError> {
        if qos == QoS::AtMostOnce {
            return Ok(PublishState::PublishDone);
        }
        if packet_id == 0 {
            return Err(MqttClientError::BadParameter(
                "packet identifier must be non-zero",
            ));
        }

        let new_state = calculate_state_publish(operation, qos);

        match operation {
            Operation::Send => match self.find(packet_id, Operation::Send) {
                Some(i) => {
                    let record = self.slots[i].as_mut().unwrap();
                    if record.state != PublishState::PublishSend {
                        return Err(MqttClientError::IllegalState { packet_id });
                    }
                    record.state = new_state;
                    Ok(new_state)
                }
                None => Err(MqttClientError::BadParameter(
                    "packet identifier was not reserved",
                )),
            },
            Operation::Receive => match self.find(packet_id, Operation::Receive) {
                Some(i) => {
                    let record = self.slots[i].as_mut().unwrap();
                    let resend_ok = match qos {
                        QoS::AtLeastOnce => record.state == PublishState::PubAckSend,
                        QoS::ExactlyOnce => matches!(
                            record.state,
                            PublishState::PubRecSend | PublishState::PubRelPending
                        ),
                        QoS::AtMostOnce => unreachable!(),
                    };
                    if !resend_ok || record.qos != qos {
                        return Err(MqttClientError::IllegalState { packet_id });
                    }
                    record.state = new_state;
                    Ok(new_state)
                }
                None => {
                    self.insert(PublishRecord {
                        packet_id,
                        qos,
                        state: new_state,
                        originator: Operation::Receive,
                    })?;
                    Ok(new_state)
                }
            },
        }
    }

    /// Advance a record for an acknowledgement packet event.
    ///
    /// Completed exchanges are removed from the table; the returned state is
    /// [`PublishState::PublishDone`] in that case.
    pub fn update_ack(
        &mut self,
        packet_id: u16,
        ack_type: ControlPacketType,
        operation: Operation,
    ) -> Result<PublishState, MqttClientError> {
        let originator = ack_originator(ack_type, operation).ok_or(
            MqttClientError::BadParameter("packet type is not a publish acknowledgement"),
        )?;

        let index = match self.find(packet_id, originator) {
            Some(i) => i,
            // The broker acknowledged something we never sent, or we are
            // about to acknowledge something we never received.
            None => {
                return Err(match operation {
                    Operation::Receive => {
                        MqttClientError::BadResponse("acknowledgement for unknown packet id")
                    }
                    Operation::Send => MqttClientError::IllegalState { packet_id },
                })
            }
        };

        let new_state = calculate_state_ack(ack_type, operation);
        if new_state == PublishState::StateNull {
            return Err(MqttClientError::IllegalState { packet_id });
        }

        let current = self.slots[index].as_ref().unwrap().state;
        if !ack_transition_is_valid(current, new_state) {
            return Err(MqttClientError::IllegalState { packet_id });
        }

        if new_state == PublishState::PublishDone {
            self.slots[index] = None;
        } else {
            self.slots[index].as_mut().unwrap().state = new_state;
        }
        Ok(new_state)
    }
}
