//! `plan` and `decide`: coordination over JSON workflow files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use enhanced_cognee::config::CogneeConfig;
use enhanced_cognee::coordination::{
    AgentProfile, AssignmentReport, Decision, DecisionBoard, Progress, Task, Tally,
    TaskOrchestrator,
};

#[derive(Debug, Deserialize)]
struct Workflow {
    agents: Vec<AgentProfile>,
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Ballot {
    proposal: ProposalInput,
    /// Voter profiles; a vote without an explicit weight uses its agent's.
    #[serde(default)]
    agents: Vec<AgentProfile>,
    /// Defaults to the summed weight of `agents`, or of the votes when no
    /// agents are listed.
    eligible_weight: Option<f64>,
    #[serde(default)]
    votes: Vec<BallotVote>,
}

#[derive(Debug, Deserialize)]
struct ProposalInput {
    id: String,
    title: String,
    options: Vec<String>,
    quorum: Option<f64>,
    threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BallotVote {
    agent_id: String,
    option: String,
    weight: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PlanOutput {
    waves: Vec<Vec<String>>,
    rounds: Vec<AssignmentReport>,
    progress: Progress,
}

#[derive(Debug, Serialize)]
struct DecideOutput {
    tally: Tally,
    decision: Decision,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Load a workflow, print its execution waves and assignment rounds.
///
/// With `simulate`, each round's assignments are marked completed so later
/// waves become ready; otherwise only the first round is planned.
pub fn plan(config: &CogneeConfig, path: &Path, simulate: bool, json: bool) -> Result<()> {
    let workflow: Workflow = read_json(path)?;
    let mut orchestrator = TaskOrchestrator::new(&config.coordination);
    orchestrator.add_tasks(workflow.tasks)?;

    let waves = orchestrator.execution_waves()?;
    let mut rounds = Vec::new();
    loop {
        let report = orchestrator.assign_tasks(&workflow.agents);
        let stalled = report.assigned.is_empty();
        if simulate {
            for a in &report.assigned {
                orchestrator.start(&a.task_id)?;
                orchestrator.complete(&a.task_id, format!("completed by {}", a.agent_id))?;
            }
        }
        rounds.push(report);
        if !simulate || stalled {
            break;
        }
    }
    let progress = orchestrator.progress();

    if json {
        let out = PlanOutput { waves, rounds, progress };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Execution waves:");
    for (i, wave) in waves.iter().enumerate() {
        println!("  {}. {}", i + 1, wave.join(", "));
    }
    println!();
    for (i, round) in rounds.iter().enumerate() {
        if round.assigned.is_empty() && round.unassigned.is_empty() {
            continue;
        }
        println!("Round {}:", i + 1);
        for a in &round.assigned {
            println!("  {:<24} -> {} (overlap {})", a.task_id, a.agent_id, a.score);
        }
        for id in &round.unassigned {
            println!("  {id:<24} -> (no eligible agent)");
        }
    }
    println!();
    println!(
        "Progress: {} total, {} pending, {} assigned, {} completed",
        progress.total, progress.pending, progress.assigned, progress.completed
    );
    Ok(())
}

/// Tally a ballot file and print the decision.
pub fn decide(config: &CogneeConfig, path: &Path, json: bool) -> Result<()> {
    let ballot: Ballot = read_json(path)?;
    let p = &ballot.proposal;
    let options: Vec<&str> = p.options.iter().map(String::as_str).collect();

    let mut board = DecisionBoard::new();
    board.open_proposal(
        &p.id,
        &p.title,
        &options,
        p.quorum.unwrap_or(config.coordination.quorum),
        p.threshold.unwrap_or(config.coordination.approval_threshold),
    )?;
    let mut cast_weight = 0.0;
    for vote in &ballot.votes {
        let profile = ballot.agents.iter().find(|a| a.id == vote.agent_id);
        match (vote.weight, profile) {
            (Some(weight), _) => {
                board.cast_vote(&p.id, &vote.agent_id, &vote.option, weight)?;
                cast_weight += weight;
            }
            (None, Some(agent)) => {
                board.cast_agent_vote(&p.id, agent, &vote.option)?;
                cast_weight += agent.weight;
            }
            (None, None) => {
                board.cast_vote(&p.id, &vote.agent_id, &vote.option, 1.0)?;
                cast_weight += 1.0;
            }
        }
    }

    let eligible = match ballot.eligible_weight {
        Some(weight) => weight,
        None if !ballot.agents.is_empty() => ballot.agents.iter().map(|a| a.weight).sum(),
        None => cast_weight,
    };
    let tally = board.tally(&p.id, eligible)?;
    let decision = board.close(&p.id, eligible)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&DecideOutput { tally, decision })?);
        return Ok(());
    }

    println!("Proposal: {} ({})", p.title, p.id);
    for total in &tally.totals {
        println!("  {:<20} {:.2}", total.option, total.weight);
    }
    println!("Turnout: {:.1}% of {eligible:.2}", tally.turnout * 100.0);
    match decision {
        Decision::Accepted { option, share } => {
            println!("Accepted: {option} ({:.1}% of cast weight)", share * 100.0)
        }
        Decision::Rejected { leader, share } => {
            println!("Rejected: leader {leader} reached only {:.1}%", share * 100.0)
        }
        Decision::Tie { options } => println!("Tie between {}", options.join(", ")),
        Decision::NoQuorum { turnout } => {
            println!("No quorum: turnout {:.1}%", turnout * 100.0)
        }
    }
    Ok(())
}
