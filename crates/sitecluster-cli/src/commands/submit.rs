//! Submit command implementation.

use anyhow::{Context, Result};
use tracing::info;

use sitecluster_sched::SubmitRequest;

use super::common::connect_cluster;
use crate::cli::SubmitArgs;

/// Translate parsed options into a scheduler-neutral request.
pub fn build_request(args: &SubmitArgs) -> Result<SubmitRequest> {
    let mut request = SubmitRequest::new(args.command.iter().cloned());

    if let Some(queue) = &args.queue {
        request = request.with_queue(queue);
    }
    if let Some(nodes) = args.nodes {
        request = request.with_nodes(nodes);
    }
    if let Some(threads) = args.threads {
        request = request.with_threads(threads);
    }
    if let Some(memory) = &args.memory {
        request = request.with_memory(memory);
    }
    if let Some(name) = &args.job_name {
        request = request.with_job_name(name);
    }
    if let Some(email) = &args.email {
        request = request.with_email(email);
    }
    if let Some(at) = &args.at_time {
        request = request.with_at_time(at);
    }
    if let Some(end) = &args.end_time {
        request = request.with_end_time(end);
    }
    if let Some(after) = &args.after {
        request = request
            .with_after_literal(after)
            .with_context(|| format!("Invalid --after value: {after}"))?;
    }
    if let Some(index) = args.start_node {
        request = request.with_start_node(index);
    }
    if let Some(user) = &args.user {
        request = request.with_user(user);
    }
    if let Some(project) = &args.project {
        request = request.with_project(project);
    }
    if let Some(group) = &args.group {
        request = request.with_group(group);
    }
    for entry in &args.custom_args {
        request = request.with_custom_args(entry);
    }

    Ok(request)
}

/// Submit the job and print its identifier.
pub async fn execute(args: &SubmitArgs) -> Result<()> {
    let request = build_request(args)?;
    let cluster = connect_cluster()?;

    let job_id = cluster.submit(&request).await?;
    info!(backend = %cluster.kind(), job_id = %job_id, "submitted");
    println!("{job_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let args = SubmitArgs {
            queue: Some("batch".to_string()),
            after: Some("['1.srv', '2.srv']".to_string()),
            custom_args: vec!["-l walltime=1:00:00".to_string(), "-p 5".to_string()],
            command: vec!["run.sh".to_string(), "in.dat".to_string()],
            ..SubmitArgs::default()
        };
        let request = build_request(&args).unwrap();
        assert_eq!(request.queue(), Some("batch"));
        assert_eq!(request.after(), ["1.srv", "2.srv"]);
        assert_eq!(
            request.custom_tokens().unwrap(),
            ["-l", "walltime=1:00:00", "-p", "5"]
        );
        assert_eq!(request.command(), ["run.sh", "in.dat"]);
    }

    #[test]
    fn test_build_request_rejects_expression_dependency() {
        let args = SubmitArgs {
            after: Some("__import__('os')".to_string()),
            command: vec!["run.sh".to_string()],
            ..SubmitArgs::default()
        };
        assert!(build_request(&args).is_err());
    }
}
