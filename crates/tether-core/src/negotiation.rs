//! Negotiation state machine
//!
//! The transition function is pure: callers apply the returned state under
//! their own lock, so a rejected event can never leave a session half
//! mutated.

use crate::error::{Error, Result};

/// Where one session stands in its offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// No offer has been seen or sent.
    Idle,
    /// We sent an offer and are waiting for the remote answer.
    OfferSent,
    /// A remote offer arrived and is with the engine.
    OfferReceived,
    /// The engine's answer has been handed to the connection for delivery.
    AnswerSent,
    /// The remote answer arrived for an offer we sent.
    AnswerReceived,
    /// At least one candidate has been exchanged since the answer.
    CandidatesExchanging,
    /// The engine reports the peer transport is up.
    Open,
    Closing,
    Closed,
}

/// Inputs that can advance a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationEvent {
    /// Inbound keepalive probe; rejected only once closed.
    Ping,
    /// A remote offer arrived.
    OfferReceived,
    /// A local offer was handed to the link (offering role).
    OfferSent,
    /// The engine produced an answer for a received offer.
    AnswerGenerated,
    /// The remote answer arrived for an offer we sent (offering role).
    AnswerReceived,
    /// A remote candidate arrived.
    CandidateReceived,
    /// The engine reports the peer transport opened.
    TransportOpened,
    /// The engine reports the peer transport closed or failed.
    TransportClosed,
}

/// Compute the state following `event`.
///
/// Returns [`Error::InvalidTransition`] when the current state does not
/// permit the event; the caller's state is untouched either way.
pub fn transition(state: NegotiationState, event: NegotiationEvent) -> Result<NegotiationState> {
    use NegotiationEvent as Ev;
    use NegotiationState as St;

    let next = match (event, state) {
        (Ev::Ping, s) if s != St::Closed => s,

        (Ev::OfferReceived, St::Idle) => St::OfferReceived,
        (Ev::OfferSent, St::Idle) => St::OfferSent,

        (Ev::AnswerGenerated, St::OfferReceived) => St::AnswerSent,
        (Ev::AnswerReceived, St::OfferSent) => St::AnswerReceived,

        (
            Ev::CandidateReceived,
            St::OfferReceived
            | St::AnswerSent
            | St::AnswerReceived
            | St::CandidatesExchanging
            | St::Open,
        ) => St::CandidatesExchanging,

        (Ev::TransportOpened, St::CandidatesExchanging | St::AnswerSent | St::AnswerReceived) => {
            St::Open
        }

        (Ev::TransportClosed, _) => St::Closed,

        (event, state) => return Err(Error::InvalidTransition { event, state }),
    };

    Ok(next)
}

/// True when a candidate arriving in `state` should be held back rather
/// than rejected: the offer/answer exchange it belongs to is still in
/// flight, a common race with out-of-order delivery.
pub fn buffers_candidates(state: NegotiationState) -> bool {
    matches!(state, NegotiationState::Idle | NegotiationState::OfferSent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationEvent as Ev;
    use NegotiationState as St;

    #[test]
    fn ping_leaves_every_live_state_unchanged() {
        for state in [
            St::Idle,
            St::OfferSent,
            St::OfferReceived,
            St::AnswerSent,
            St::AnswerReceived,
            St::CandidatesExchanging,
            St::Open,
            St::Closing,
        ] {
            assert_eq!(transition(state, Ev::Ping).unwrap(), state);
        }
        assert!(transition(St::Closed, Ev::Ping).is_err());
    }

    #[test]
    fn offer_only_from_idle() {
        assert_eq!(
            transition(St::Idle, Ev::OfferReceived).unwrap(),
            St::OfferReceived
        );
        for state in [St::OfferReceived, St::AnswerSent, St::Open, St::Closed] {
            assert!(transition(state, Ev::OfferReceived).is_err());
        }
    }

    #[test]
    fn answer_follows_offer() {
        assert_eq!(
            transition(St::OfferReceived, Ev::AnswerGenerated).unwrap(),
            St::AnswerSent
        );
        assert!(transition(St::Idle, Ev::AnswerGenerated).is_err());
        assert!(transition(St::AnswerSent, Ev::AnswerGenerated).is_err());
    }

    #[test]
    fn candidates_require_a_live_exchange() {
        for state in [
            St::OfferReceived,
            St::AnswerSent,
            St::AnswerReceived,
            St::CandidatesExchanging,
            St::Open,
        ] {
            assert_eq!(
                transition(state, Ev::CandidateReceived).unwrap(),
                St::CandidatesExchanging
            );
        }
        assert!(transition(St::Idle, Ev::CandidateReceived).is_err());
        assert!(transition(St::Closed, Ev::CandidateReceived).is_err());
    }

    #[test]
    fn transport_open_requires_answered_exchange() {
        for state in [St::CandidatesExchanging, St::AnswerSent, St::AnswerReceived] {
            assert_eq!(transition(state, Ev::TransportOpened).unwrap(), St::Open);
        }
        assert!(transition(St::Idle, Ev::TransportOpened).is_err());
        assert!(transition(St::OfferReceived, Ev::TransportOpened).is_err());
    }

    #[test]
    fn transport_close_is_always_permitted() {
        for state in [St::Idle, St::OfferSent, St::Open, St::Closing, St::Closed] {
            assert_eq!(transition(state, Ev::TransportClosed).unwrap(), St::Closed);
        }
    }

    #[test]
    fn offering_role_dual() {
        let state = transition(St::Idle, Ev::OfferSent).unwrap();
        assert_eq!(state, St::OfferSent);
        let state = transition(state, Ev::AnswerReceived).unwrap();
        assert_eq!(state, St::AnswerReceived);
        let state = transition(state, Ev::CandidateReceived).unwrap();
        assert_eq!(state, St::CandidatesExchanging);
        assert_eq!(transition(state, Ev::TransportOpened).unwrap(), St::Open);
    }

    #[test]
    fn early_candidates_are_buffered_not_rejected() {
        assert!(buffers_candidates(St::Idle));
        assert!(buffers_candidates(St::OfferSent));
        assert!(!buffers_candidates(St::OfferReceived));
        assert!(!buffers_candidates(St::Closed));
    }

    #[test]
    fn rejected_transition_reports_both_sides() {
        let err = transition(St::AnswerSent, Ev::OfferReceived).unwrap_err();
        match err {
            Error::InvalidTransition { event, state } => {
                assert_eq!(event, Ev::OfferReceived);
                assert_eq!(state, St::AnswerSent);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
