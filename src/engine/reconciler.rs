use tracing::debug;

use crate::models::location::{EndpointKind, OrderLocationSet};

/// Fills unresolved endpoints of the accepted order from other views of it.
///
/// `accepted` is the normalized accept-call payload. Endpoints it already
/// resolved are never replaced; each gap takes the first resolved value found
/// scanning `candidate_views` in order. Views of any other order id are skipped.
pub fn reconcile(
    mut accepted: OrderLocationSet,
    candidate_views: &[OrderLocationSet],
) -> OrderLocationSet {
    for kind in [EndpointKind::Pickup, EndpointKind::Delivery] {
        if accepted.endpoint(kind).is_resolved() {
            continue;
        }

        let filled = candidate_views
            .iter()
            .filter(|view| view.order_id == accepted.order_id)
            .map(|view| *view.endpoint(kind))
            .find(|endpoint| endpoint.is_resolved());

        if let Some(endpoint) = filled {
            debug!(
                order_id = %accepted.order_id,
                endpoint = kind.as_str(),
                source = endpoint.source.as_str(),
                "endpoint filled from candidate view"
            );
            *accepted.endpoint_mut(kind) = endpoint;
        }
    }

    accepted
}
