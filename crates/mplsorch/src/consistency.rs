//! Label operation consistency checks.
//!
//! If there is ECMP, the label operation must be the same on every path of
//! an incoming label: all paths swap, or all paths do PHP. Forwarding
//! hardware cannot mix the two. The check runs before any mutation, so an
//! inconsistent set is never observable.

use crate::error::{MplsError, Result};
use crate::label::{LabelOpClass, MplsLabel};
use crate::nexthop::AddressFamily;

/// One existing path of an incoming label, as seen by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sibling {
    /// Outgoing label of the path.
    pub out_label: MplsLabel,
    /// Address family of the path's nexthop.
    pub family: AddressFamily,
}

/// Checks a proposed path against its siblings.
///
/// `siblings` must not contain the path being replaced (an in-place update
/// of an existing definition is checked against the others only). With no
/// siblings the proposal is always accepted.
pub fn check_siblings<I>(
    in_label: MplsLabel,
    out_label: MplsLabel,
    family: AddressFamily,
    siblings: I,
) -> Result<()>
where
    I: IntoIterator<Item = Sibling>,
{
    let new_class = LabelOpClass::from_out_label(out_label);

    for sibling in siblings {
        if sibling.family != family {
            return Err(MplsError::FamilyMismatch(in_label));
        }
        if sibling.out_label.op_class() != new_class {
            return Err(MplsError::InconsistentLabelOp {
                in_label,
                out_label,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(v: u32) -> MplsLabel {
        MplsLabel::new(v).unwrap()
    }

    fn swap(v: u32) -> Sibling {
        Sibling {
            out_label: label(v),
            family: AddressFamily::Ipv4,
        }
    }

    #[test]
    fn test_first_path_always_accepted() {
        assert!(check_siblings(
            label(100),
            MplsLabel::IMPLICIT_NULL,
            AddressFamily::Ipv4,
            std::iter::empty()
        )
        .is_ok());
    }

    #[test]
    fn test_swap_with_swap_siblings() {
        assert!(check_siblings(
            label(100),
            label(300),
            AddressFamily::Ipv4,
            [swap(200), swap(201)]
        )
        .is_ok());
    }

    #[test]
    fn test_php_rejected_among_swaps() {
        let err = check_siblings(
            label(100),
            MplsLabel::IMPLICIT_NULL,
            AddressFamily::Ipv4,
            [swap(200)],
        )
        .unwrap_err();
        assert!(matches!(err, MplsError::InconsistentLabelOp { .. }));
    }

    #[test]
    fn test_swap_rejected_among_php() {
        let php = Sibling {
            out_label: MplsLabel::IMPLICIT_NULL,
            family: AddressFamily::Ipv4,
        };
        assert!(check_siblings(label(100), label(200), AddressFamily::Ipv4, [php]).is_err());
        assert!(check_siblings(
            label(100),
            MplsLabel::IMPLICIT_NULL,
            AddressFamily::Ipv4,
            [php]
        )
        .is_ok());
    }

    #[test]
    fn test_explicit_null_is_a_swap() {
        assert!(check_siblings(
            label(100),
            MplsLabel::IPV4_EXPLICIT_NULL,
            AddressFamily::Ipv4,
            [swap(200)]
        )
        .is_ok());
    }

    #[test]
    fn test_family_mismatch() {
        let err = check_siblings(label(100), label(200), AddressFamily::Ipv6, [swap(200)])
            .unwrap_err();
        assert!(matches!(err, MplsError::FamilyMismatch(_)));
    }
}
