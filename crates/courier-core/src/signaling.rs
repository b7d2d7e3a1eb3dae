//! WebRTC call signaling.
//!
//! The hub never looks inside offers, answers or candidates. It only routes
//! them to the target user's room, tagged with who sent them. An offline
//! target simply receives nothing.

use crate::connection::ConnectionId;
use crate::hub::Hub;
use courier_protocol::events::{CallTarget, CallUser, IceCandidate, MakeAnswer};
use courier_protocol::notices::{CallAnswer, CallClosed, CallOffer, IceRelay};
use courier_protocol::outbound;
use serde_json::Value;
use tracing::debug;

impl Hub {
    /// `call_user` → `call_made`.
    pub(crate) fn relay_call(&self, connection_id: &ConnectionId, call: CallUser) {
        let caller = self.rooms.user_of(connection_id);
        let from = match (&call.from, &caller) {
            (Value::Null, Some(user)) => Value::String(user.clone()),
            (from, _) => from.clone(),
        };

        let offer = CallOffer {
            signal: &call.signal_data,
            from: &from,
            call_type: &call.call_type,
            caller_info: &call.caller_info,
        };
        let delivered = self.rooms.broadcast(
            &call.user_to_call,
            outbound::CALL_MADE,
            &offer,
            Some(connection_id),
        );
        debug!(to = %call.user_to_call, from = ?caller, delivered, "Relayed call offer");
    }

    /// `make_answer` → `answer_made`.
    pub(crate) fn relay_answer(&self, connection_id: &ConnectionId, answer: MakeAnswer) {
        let caller = self.rooms.user_of(connection_id);
        let notice = CallAnswer {
            signal: &answer.signal_data,
            from: caller.as_deref(),
        };
        self.rooms
            .broadcast(&answer.to, outbound::ANSWER_MADE, &notice, Some(connection_id));
    }

    /// `ice_candidate` → `ice_candidate`.
    pub(crate) fn relay_ice_candidate(&self, connection_id: &ConnectionId, ice: IceCandidate) {
        let caller = self.rooms.user_of(connection_id);
        let notice = IceRelay {
            candidate: &ice.candidate,
            from: caller.as_deref(),
        };
        self.rooms
            .broadcast(&ice.to, outbound::ICE_CANDIDATE, &notice, Some(connection_id));
    }

    /// `reject_call` / `end_call` → `call_rejected` / `call_ended`.
    pub(crate) fn relay_closed(
        &self,
        connection_id: &ConnectionId,
        event: &str,
        target: CallTarget,
    ) {
        let caller = self.rooms.user_of(connection_id);
        let notice = CallClosed {
            from: caller.as_deref(),
        };
        self.rooms
            .broadcast(&target.to, event, &notice, Some(connection_id));
        debug!(to = %target.to, from = ?caller, event = %event, "Relayed call teardown");
    }
}
