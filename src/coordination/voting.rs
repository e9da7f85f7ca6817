//! Weighted voting on proposals with quorum and approval thresholds.

use serde::Serialize;
use std::collections::HashMap;

use super::{AgentProfile, CoordinationError};

/// Shares within this distance count as equal.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub agent_id: String,
    pub option: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Proposal {
    pub id: String,
    pub title: String,
    pub options: Vec<String>,
    pub quorum: f64,
    pub threshold: f64,
    pub votes: Vec<Vote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
}

impl Proposal {
    pub fn is_closed(&self) -> bool {
        self.decision.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionTotal {
    pub option: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    /// In the proposal's option order.
    pub totals: Vec<OptionTotal>,
    pub cast_weight: f64,
    /// Cast weight over eligible weight.
    pub turnout: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    /// Leader's fraction of the cast weight.
    pub leader_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Accepted { option: String, share: f64 },
    Rejected { leader: String, share: f64 },
    Tie { options: Vec<String> },
    NoQuorum { turnout: f64 },
}

#[derive(Debug, Default)]
pub struct DecisionBoard {
    proposals: HashMap<String, Proposal>,
}

impl DecisionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_proposal(
        &mut self,
        id: &str,
        title: &str,
        options: &[&str],
        quorum: f64,
        threshold: f64,
    ) -> Result<(), CoordinationError> {
        if self.proposals.contains_key(id) {
            return Err(CoordinationError::DuplicateProposal(id.to_string()));
        }
        let mut distinct: Vec<String> = Vec::with_capacity(options.len());
        for option in options.iter().map(|o| o.trim()) {
            if option.is_empty() {
                return Err(CoordinationError::InvalidProposal("empty option".into()));
            }
            if !distinct.iter().any(|o| o == option) {
                distinct.push(option.to_string());
            }
        }
        if distinct.len() < 2 {
            return Err(CoordinationError::InvalidProposal(
                "at least two distinct options are required".into(),
            ));
        }
        for (name, value) in [("quorum", quorum), ("threshold", threshold)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CoordinationError::InvalidProposal(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }

        self.proposals.insert(
            id.to_string(),
            Proposal {
                id: id.to_string(),
                title: title.to_string(),
                options: distinct,
                quorum,
                threshold,
                votes: Vec::new(),
                decision: None,
            },
        );
        tracing::debug!(proposal = id, "proposal opened");
        Ok(())
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn cast_vote(
        &mut self,
        proposal_id: &str,
        agent_id: &str,
        option: &str,
        weight: f64,
    ) -> Result<(), CoordinationError> {
        check_weight(weight)?;
        let proposal = self.open_proposal_mut(proposal_id)?;
        if !proposal.options.iter().any(|o| o == option) {
            return Err(CoordinationError::UnknownOption {
                proposal: proposal_id.to_string(),
                option: option.to_string(),
            });
        }
        if proposal.votes.iter().any(|v| v.agent_id == agent_id) {
            return Err(CoordinationError::DuplicateVote {
                proposal: proposal_id.to_string(),
                agent: agent_id.to_string(),
            });
        }
        proposal.votes.push(Vote {
            agent_id: agent_id.to_string(),
            option: option.to_string(),
            weight,
        });
        Ok(())
    }

    /// Cast a vote carrying the agent's profile weight.
    pub fn cast_agent_vote(
        &mut self,
        proposal_id: &str,
        agent: &AgentProfile,
        option: &str,
    ) -> Result<(), CoordinationError> {
        self.cast_vote(proposal_id, &agent.id, option, agent.weight)
    }

    /// Zero eligible weight is accepted only while no votes are cast.
    pub fn tally(&self, proposal_id: &str, eligible_weight: f64) -> Result<Tally, CoordinationError> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| CoordinationError::ProposalNotFound(proposal_id.to_string()))?;
        check_eligible(proposal, eligible_weight)?;
        Ok(tally_of(proposal, eligible_weight))
    }

    /// Close voting and decide. Checked in order: quorum, tie, threshold.
    pub fn close(&mut self, proposal_id: &str, eligible_weight: f64) -> Result<Decision, CoordinationError> {
        let proposal = self.open_proposal_mut(proposal_id)?;
        check_eligible(proposal, eligible_weight)?;
        let tally = tally_of(proposal, eligible_weight);

        let decision = decide(proposal, &tally);
        proposal.decision = Some(decision.clone());

        tracing::info!(proposal = proposal_id, ?decision, turnout = tally.turnout, "proposal closed");
        Ok(decision)
    }

    fn open_proposal_mut(&mut self, proposal_id: &str) -> Result<&mut Proposal, CoordinationError> {
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| CoordinationError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.is_closed() {
            return Err(CoordinationError::ProposalClosed(proposal_id.to_string()));
        }
        Ok(proposal)
    }
}

fn check_weight(weight: f64) -> Result<(), CoordinationError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(CoordinationError::InvalidWeight(weight))
    }
}

fn check_eligible(proposal: &Proposal, eligible_weight: f64) -> Result<(), CoordinationError> {
    if proposal.votes.is_empty() && eligible_weight == 0.0 {
        return Ok(());
    }
    check_weight(eligible_weight)
}

fn tally_of(proposal: &Proposal, eligible_weight: f64) -> Tally {
    let totals: Vec<OptionTotal> = proposal
        .options
        .iter()
        .map(|option| OptionTotal {
            option: option.clone(),
            weight: proposal
                .votes
                .iter()
                .filter(|v| &v.option == option)
                .map(|v| v.weight)
                .sum(),
        })
        .collect();
    let cast_weight: f64 = totals.iter().map(|t| t.weight).sum();

    // First option wins ties here; `decide` reports real ties separately.
    let leader = totals
        .iter()
        .filter(|t| t.weight > 0.0)
        .fold(None::<&OptionTotal>, |best, t| match best {
            Some(b) if b.weight >= t.weight => Some(b),
            _ => Some(t),
        });

    Tally {
        turnout: if eligible_weight > 0.0 {
            cast_weight / eligible_weight
        } else {
            0.0
        },
        leader_share: match leader {
            Some(l) if cast_weight > 0.0 => l.weight / cast_weight,
            _ => 0.0,
        },
        leader: leader.map(|l| l.option.clone()),
        cast_weight,
        totals,
    }
}

fn decide(proposal: &Proposal, tally: &Tally) -> Decision {
    let Some(leader) = tally.leader.clone() else {
        return Decision::NoQuorum { turnout: tally.turnout };
    };
    if tally.turnout + TIE_EPSILON < proposal.quorum {
        return Decision::NoQuorum { turnout: tally.turnout };
    }

    let top = tally.leader_share * tally.cast_weight;
    let tied: Vec<String> = tally
        .totals
        .iter()
        .filter(|t| (t.weight - top).abs() <= TIE_EPSILON)
        .map(|t| t.option.clone())
        .collect();
    if tied.len() > 1 {
        return Decision::Tie { options: tied };
    }

    if tally.leader_share + TIE_EPSILON < proposal.threshold {
        Decision::Rejected {
            leader,
            share: tally.leader_share,
        }
    } else {
        Decision::Accepted {
            option: leader,
            share: tally.leader_share,
        }
    }
}
