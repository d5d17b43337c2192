use crate::journal::{Journal, JournalError, NewNode};
use actiontree_core::{NodeKind, TraceInfo};

/// Demo trace: a failed first plan and the revised one that succeeded.
pub fn seed_demo(journal: &mut Journal) -> Result<TraceInfo, JournalError> {
    let trace = journal.create_trace("Todo App Creation", Some("AI agent actions for creating a Todo application"));
    let t = &trace.id;

    let mut prompt = NewNode::new(t.clone(), NodeKind::Logging, "Initial Prompt");
    prompt.content = Some("Create a web application that displays a list of todos".into());
    prompt.log_level = Some("INFO".into());
    let root = journal.create_node(prompt)?;

    let mut plan = NewNode::new(t.clone(), NodeKind::Decision, "Planning Application Structure");
    plan.parent_id = Some(root.id.clone());
    plan.content = Some("I need to create both frontend and backend components".into());
    plan.decision_outcome = Some("Use React with Next.js".into());
    let plan = journal.create_node(plan)?;

    let mut failed = NewNode::new(t.clone(), NodeKind::Terminal, "Implementation Failed");
    failed.parent_id = Some(plan.id);
    failed.content = Some("The chosen approach with server components is not compatible with the requirements".into());
    failed.termination_reason = Some("Incompatible technology choice".into());
    journal.create_node(failed)?;

    let mut revised = NewNode::new(t.clone(), NodeKind::Decision, "Revised Planning");
    revised.parent_id = Some(root.id);
    revised.content = Some("Need to use a different frontend approach".into());
    revised.decision_outcome = Some("Use React with client components".into());
    let revised = journal.create_node(revised)?;

    let mut write = NewNode::new(t.clone(), NodeKind::ToolCall, "Tool Call: write_file");
    write.parent_id = Some(revised.id);
    write.content = Some("Arguments: {\"path\":\"src/TodoList.jsx\"}\nResult: ok".into());
    write.tool_name = Some("write_file".into());
    let write = journal.create_node(write)?;

    let mut done = NewNode::new(t.clone(), NodeKind::Logging, "Implementation Complete");
    done.parent_id = Some(write.id);
    done.content = Some("Todo application has been successfully implemented".into());
    done.log_level = Some("SUCCESS".into());
    journal.create_node(done)?;

    tracing::info!(trace_id = %trace.id, nodes = journal.node_count(&trace.id), "seeded demo trace");
    Ok(trace)
}
