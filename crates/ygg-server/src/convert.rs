use std::collections::BTreeMap;
use std::fmt;

use ygg_coordinator::TopologyChangeResult;
use ygg_topology::MemberState;
use ygg_types::{MemberId, TopologyError};

use crate::request::TopologyChangeResponse;

pub fn change_response(result: TopologyChangeResult) -> TopologyChangeResponse {
    TopologyChangeResponse {
        change_id: result.change_id,
        current_members: result.current_topology.members().clone(),
        expected_members: result.final_topology.members().clone(),
        operations: result.operations,
    }
}

pub fn require_members(members: &[MemberId]) -> Result<(), TopologyError> {
    if members.is_empty() {
        return Err(TopologyError::invalid("members must not be empty"));
    }
    Ok(())
}

/// One line per member: status, then `partition:priority` for each replica.
pub fn write_members(
    f: &mut fmt::Formatter<'_>,
    members: &BTreeMap<MemberId, MemberState>,
) -> fmt::Result {
    for (id, state) in members {
        let partitions: Vec<String> = state
            .partitions
            .iter()
            .map(|(p, s)| format!("{p}:{}", s.priority))
            .collect();
        writeln!(f, "  {id} {:?} [{}]", state.status, partitions.join(", "))?;
    }
    Ok(())
}
