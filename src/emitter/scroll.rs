use super::sink::PointerAction;
use crate::gesture::{GestureEvent, GestureKind};
use crate::touch::ContactId;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollAxis {
    Vertical,
    Horizontal,
    Both,
}

/// Turns multi-touch movement into wheel steps.
///
/// Only the first contact that moves during a session drives scrolling. With
/// two fingers the direction locks onto the dominant axis of the first
/// movement; three or more fingers scroll in both axes.
#[derive(Debug)]
pub struct ScrollTranslator {
    divisor: i32,
    primary: Option<ContactId>,
    axis: Option<ScrollAxis>,
    pending: (i32, i32),
}

impl ScrollTranslator {
    pub fn new(divisor: u32) -> Self {
        Self {
            divisor: i32::try_from(divisor.max(1)).unwrap_or(i32::MAX),
            primary: None,
            axis: None,
            pending: (0, 0),
        }
    }

    /// Forget the previous session
    pub fn reset(&mut self) {
        self.primary = None;
        self.axis = None;
        self.pending = (0, 0);
    }

    pub fn feed(&mut self, event: &GestureEvent) -> Option<PointerAction> {
        let GestureKind::MultiTouchMove { delta } = event.kind else {
            return None;
        };

        let contact = event.contact?;
        if *self.primary.get_or_insert(contact) != contact {
            return None;
        }

        self.pending.0 += delta.0;
        self.pending.1 += delta.1;

        if event.fingers >= 3 {
            self.axis = Some(ScrollAxis::Both);
        }

        let axis = match self.axis {
            Some(axis) => axis,
            None => {
                let (dx, dy) = (self.pending.0.abs(), self.pending.1.abs());
                if dx.max(dy) < self.divisor || dx == dy {
                    return None;
                }
                let axis = if dy > dx {
                    ScrollAxis::Vertical
                } else {
                    ScrollAxis::Horizontal
                };
                debug!("Scroll locked to {:?}", axis);
                self.axis = Some(axis);
                axis
            }
        };

        // Content follows the fingers: moving down scrolls up
        let vertical = match axis {
            ScrollAxis::Vertical | ScrollAxis::Both => self.take_steps(1),
            ScrollAxis::Horizontal => 0,
        };
        let horizontal = match axis {
            ScrollAxis::Horizontal | ScrollAxis::Both => -self.take_steps(0),
            ScrollAxis::Vertical => 0,
        };

        if vertical == 0 && horizontal == 0 {
            return None;
        }
        Some(PointerAction::Scroll {
            vertical,
            horizontal,
        })
    }

    /// Whole steps accumulated on one axis; the remainder is kept
    fn take_steps(&mut self, axis: usize) -> i32 {
        let pending = if axis == 0 {
            &mut self.pending.0
        } else {
            &mut self.pending.1
        };
        let steps = *pending / self.divisor;
        *pending -= steps * self.divisor;
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Point;
    use std::time::Duration;

    fn movement(contact: u64, fingers: u8, dx: i32, dy: i32) -> GestureEvent {
        GestureEvent::new(
            GestureKind::MultiTouchMove { delta: (dx, dy) },
            Point::new(0, 0),
            Duration::ZERO,
        )
        .with_fingers(fingers)
        .for_contact(ContactId(contact))
    }

    #[test]
    fn test_two_fingers_lock_to_dominant_axis() {
        let mut scroll = ScrollTranslator::new(8);

        assert_eq!(scroll.feed(&movement(1, 2, 1, 4)), None);
        assert_eq!(
            scroll.feed(&movement(1, 2, 3, 12)),
            Some(PointerAction::Scroll {
                vertical: 2,
                horizontal: 0
            })
        );

        // Horizontal motion is ignored once locked vertically
        assert_eq!(scroll.feed(&movement(1, 2, 40, 0)), None);
    }

    #[test]
    fn test_remainder_carries_over() {
        let mut scroll = ScrollTranslator::new(8);

        scroll.feed(&movement(1, 2, 0, 12));
        assert_eq!(
            scroll.feed(&movement(1, 2, 0, 4)),
            Some(PointerAction::Scroll {
                vertical: 1,
                horizontal: 0
            })
        );
    }

    #[test]
    fn test_three_fingers_scroll_both_axes() {
        let mut scroll = ScrollTranslator::new(8);

        assert_eq!(
            scroll.feed(&movement(1, 3, 16, -8)),
            Some(PointerAction::Scroll {
                vertical: -1,
                horizontal: -2
            })
        );
    }

    #[test]
    fn test_only_primary_contact_scrolls() {
        let mut scroll = ScrollTranslator::new(8);

        scroll.feed(&movement(1, 2, 0, 2));
        assert_eq!(scroll.feed(&movement(2, 2, 0, 50)), None);

        scroll.reset();
        assert!(scroll.feed(&movement(2, 2, 0, 50)).is_some());
    }
}
