/// Lifecycle of one displayed frame.
///
/// `Idle → Recording → Submitted → Presented → Idle`. A frame whose swapchain
/// image was unavailable goes straight from `Submitted` back to `Idle`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Recording,
    Submitted,
    Presented,
}

/// What the scheduler is about to do.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameEvent {
    Begin,
    Submit,
    Present,
    End,
}

/// A frame call arrived in a state where it makes no sense.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{event:?} is not valid while the frame is {state:?}")]
pub struct InvalidTransition {
    pub state: FrameState,
    pub event: FrameEvent,
}

impl FrameState {
    /// Returns the state after `event`, or the rejected pair.
    pub fn next(self, event: FrameEvent) -> Result<FrameState, InvalidTransition> {
        use FrameEvent as E;
        use FrameState as S;

        match (self, event) {
            (S::Idle, E::Begin) => Ok(S::Recording),
            (S::Recording, E::Submit) => Ok(S::Submitted),
            (S::Submitted, E::Present) => Ok(S::Presented),
            (S::Submitted | S::Presented, E::End) => Ok(S::Idle),
            (state, event) => Err(InvalidTransition { state, event }),
        }
    }

    /// Advances in place; on error the state is left unchanged.
    pub fn advance(&mut self, event: FrameEvent) -> Result<(), InvalidTransition> {
        *self = self.next(event)?;
        Ok(())
    }

    #[inline]
    pub fn is_recording(self) -> bool {
        self == FrameState::Recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut s = FrameState::default();
        for e in [FrameEvent::Begin, FrameEvent::Submit, FrameEvent::Present, FrameEvent::End] {
            s.advance(e).unwrap();
        }
        assert_eq!(s, FrameState::Idle);
    }

    #[test]
    fn skipped_present_returns_to_idle() {
        let s = FrameState::Submitted.next(FrameEvent::End).unwrap();
        assert_eq!(s, FrameState::Idle);
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut s = FrameState::Idle;
        let err = s.advance(FrameEvent::Present).unwrap_err();
        assert_eq!(err.state, FrameState::Idle);
        assert_eq!(s, FrameState::Idle);

        assert!(FrameState::Recording.next(FrameEvent::Begin).is_err());
        assert!(FrameState::Recording.next(FrameEvent::End).is_err());
        assert!(FrameState::Presented.next(FrameEvent::Present).is_err());
    }
}
