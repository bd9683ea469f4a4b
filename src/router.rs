//! Execution report router (C7): turns a lifecycle [`Transition`] into a wire
//! `ExecutionReport` and delivers it to the originating session, consuming
//! that session's next outbound sequence number (§4.6).

use crate::fix::message::encode_execution_report;
use crate::fix::SessionRegistry;
use crate::lifecycle::Transition;
use log::debug;

pub struct ExecutionRouter {
    sessions: SessionRegistry,
    broker_id: String,
}

impl ExecutionRouter {
    pub fn new(sessions: SessionRegistry, broker_id: String) -> Self {
        Self { sessions, broker_id }
    }

    /// Routes one transition to `order.sender_id`'s live session, if any.
    /// Silently drops (with a log line) when no session is connected for
    /// that peer — this system makes no store-and-forward guarantee (§4.6).
    pub async fn route(&self, transition: &Transition) {
        let peer_id = &transition.order.sender_id;
        let Some(session) = self.sessions.find_live(peer_id) else {
            debug!("dropping execution report for {peer_id}: no live session");
            return;
        };

        let seq_num = session.next_outbound_seq();
        let bytes = encode_execution_report(
            &self.broker_id,
            &transition.order,
            &transition.exec_id,
            transition.exec_type,
            transition.avg_px,
            transition.execution.as_ref(),
            seq_num,
        );
        session.send(bytes);
    }

    /// Routes every transition in order, as required for multi-report
    /// sequences such as an IOC fill followed by its residual cancel.
    pub async fn route_all(&self, transitions: &[Transition]) {
        for transition in transitions {
            self.route(transition).await;
        }
    }
}
