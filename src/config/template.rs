//! Starter configuration written by `agentflow init`.

/// File name `init` writes in the project root.
pub const STARTER_FILE: &str = "agentflow.yml";

/// The purchase-order pipeline with placeholder commands.
pub const STARTER_CONFIG: &str = r#"# agentflow pipeline configuration
name: po-to-so

# sequential | coordinated
execution_mode: coordinated
max_parallel_agents: 2
enable_error_recovery: true
enable_monitoring: true

dependencies:
  po_reader: []
  validation: [po_reader]
  exception_response: [validation]
  so_creator: [validation]
  summary_insights: [exception_response, so_creator]

parallel_groups:
  post_validation: [exception_response, so_creator]

agent_priorities:
  po_reader: 100
  validation: 90
  exception_response: 80
  so_creator: 80
  summary_insights: 70

agents:
  po_reader:
    command: echo "reading purchase orders"
    critical: true
  validation:
    command: echo "validating against master catalog"
    timeout: 300
  exception_response:
    command: echo "routing exceptions"
    retry_count: 1
  so_creator:
    command: echo "creating sales orders"
    retry_count: 2
  summary_insights:
    command: echo "summarizing run"
    optional: true

recovery:
  max_attempts: 3
  backoff_ms: 500
  backoff_multiplier: 2.0
  max_backoff_ms: 30000
"#;
