use crate::config::ToolsmithConfig;
use crate::engine::ToolRuntime;
use crate::error::Result;
use crate::mcp::McpTool;
use crate::proxy::{ExternalServerConfig, Launcher, RemoteSession};
use crate::tools::ToolErrorKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

struct EchoSession {
    tools: Vec<McpTool>,
}

#[async_trait]
impl RemoteSession for EchoSession {
    fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String> {
        Ok(format!("{tool} <- {arguments}"))
    }

    async fn shutdown(&self) {}
}

struct EchoLauncher;

#[async_trait]
impl Launcher for EchoLauncher {
    async fn launch(&self, _config: &ExternalServerConfig) -> Result<Arc<dyn RemoteSession>> {
        Ok(Arc::new(EchoSession {
            tools: vec![
                McpTool {
                    name: "search_issues".into(),
                    description: "Search issues".into(),
                    input_schema: json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"],
                    }),
                },
                McpTool {
                    name: "bad name".into(),
                    description: "Unusable".into(),
                    input_schema: json!({}),
                },
            ],
        }))
    }
}

async fn runtime(dir: &TempDir) -> ToolRuntime {
    let config = ToolsmithConfig::default()
        .with_tool_defs(dir.path().join("tool_defs"))
        .with_project_root(dir.path());
    ToolRuntime::builder(config)
        .launcher(Arc::new(EchoLauncher))
        .build()
        .await
        .unwrap()
}

async fn text(runtime: &ToolRuntime, name: &str, args: Value) -> String {
    let value = runtime.execute(name, args).await.into_result().unwrap();
    value.as_str().unwrap().to_string()
}

async fn kind(runtime: &ToolRuntime, name: &str, args: Value) -> ToolErrorKind {
    runtime.execute(name, args).await.error_kind().unwrap()
}

#[test]
fn test_every_entry_point_is_defined() {
    let names: Vec<String> = super::definitions().into_iter().map(|d| d.name).collect();
    for entry in super::ENTRY_POINTS {
        assert!(names.iter().any(|n| n == entry), "{entry} has no definition");
    }
    assert!(names.iter().any(|n| n == "registry.alias"));
    assert!(!super::is_entry_point("registry.alias"));
    assert!(!super::is_entry_point("mcp.connect"));
}

#[tokio::test]
async fn test_add_writes_definition_and_stub() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;

    let out = text(
        &runtime,
        "registry.add",
        json!({
            "name": "git.branch-cleanup",
            "description": "Delete merged branches",
            "parameters": r#"[{"name": "remote", "type": "string", "required": false}]"#,
        }),
    )
    .await;
    assert!(out.starts_with("Created tool: git.branch-cleanup"));
    assert!(out.contains("tool_defs/git/branch-cleanup.yaml"));
    assert!(out.contains("tools/git/branch_cleanup.sh"));

    assert!(dir.path().join("tool_defs/git/branch-cleanup.yaml").is_file());
    let stub = std::fs::read_to_string(dir.path().join("tools/git/branch_cleanup.sh")).unwrap();
    assert!(stub.contains("branch_cleanup()"));

    let def = runtime.store().find("git.branch-cleanup").await.unwrap();
    assert_eq!(def.module, "tools/git/branch_cleanup.sh");
    assert!(!def.parameters[0].required);

    // The stub runs as not implemented until someone fills it in
    assert_eq!(
        kind(&runtime, "git.branch-cleanup", json!({})).await,
        ToolErrorKind::NotImplemented
    );
}

#[tokio::test]
async fn test_nested_tool_name_gets_a_callable_stub() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    text(
        &runtime,
        "registry.add",
        json!({"name": "gh.pr.open", "description": "Open a pull request"}),
    )
    .await;

    let def = runtime.store().find("gh.pr.open").await.unwrap();
    assert_eq!(def.function, "pr_open");
    assert_eq!(def.module, "tools/gh/pr_open.sh");
    assert_eq!(
        kind(&runtime, "gh.pr.open", json!({})).await,
        ToolErrorKind::NotImplemented
    );
}

#[tokio::test]
async fn test_add_rejects_duplicates_and_bad_names() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let args = json!({"name": "demo.hello", "description": "Say hello"});

    text(&runtime, "registry.add", args.clone()).await;
    assert_eq!(
        kind(&runtime, "registry.add", args).await,
        ToolErrorKind::DuplicateName
    );
    assert_eq!(
        kind(
            &runtime,
            "registry.add",
            json!({"name": "nonamespace", "description": "x"})
        )
        .await,
        ToolErrorKind::InvalidSchema
    );
    assert_eq!(
        kind(
            &runtime,
            "registry.add",
            json!({"name": "demo.typed", "description": "x", "parameters": "{not json"})
        )
        .await,
        ToolErrorKind::InvalidSchema
    );
}

#[tokio::test]
async fn test_update_and_remove() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    text(
        &runtime,
        "registry.add",
        json!({"name": "demo.hello", "description": "Say hello"}),
    )
    .await;

    let none = text(&runtime, "registry.update", json!({"name": "demo.hello"})).await;
    assert_eq!(none, "No fields to update. Provide description or parameters.");

    let out = text(
        &runtime,
        "registry.update",
        json!({"name": "demo.hello", "description": "Greet someone"}),
    )
    .await;
    assert!(out.contains("Fields updated: description"));
    let yaml = std::fs::read_to_string(dir.path().join("tool_defs/demo/hello.yaml")).unwrap();
    assert!(yaml.contains("Greet someone"));

    let out = text(&runtime, "registry.remove", json!({"name": "demo.hello"})).await;
    assert!(out.starts_with("Removed tool: demo.hello"));
    assert!(!dir.path().join("tool_defs/demo/hello.yaml").exists());
    assert!(dir.path().join("tools/demo/hello.sh").exists());

    assert_eq!(
        kind(&runtime, "registry.remove", json!({"name": "demo.hello"})).await,
        ToolErrorKind::NotFound
    );
    assert_eq!(
        kind(&runtime, "registry.update", json!({"name": "demo.hello", "description": "x"})).await,
        ToolErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_update_rolls_back_when_write_fails() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    text(
        &runtime,
        "registry.add",
        json!({"name": "demo.hello", "description": "Say hello"}),
    )
    .await;

    // A directory where the file should be makes the write fail
    let path = dir.path().join("tool_defs/demo/hello.yaml");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let failed = runtime
        .execute(
            "registry.update",
            json!({"name": "demo.hello", "description": "Greet someone"}),
        )
        .await;
    assert!(!failed.is_success());
    let stored = runtime.store().find("demo.hello").await.unwrap();
    assert_eq!(stored.description, "Say hello");
}

#[tokio::test]
async fn test_remove_rolls_back_when_write_fails() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    for name in ["demo.hello", "demo.bye"] {
        text(&runtime, "registry.add", json!({"name": name, "description": "Greeting"})).await;
    }
    text(&runtime, "registry.alias", json!({"alias": "demo.hi", "target": "demo.hello"})).await;
    text(&runtime, "registry.alias", json!({"alias": "demo.ciao", "target": "demo.bye"})).await;

    let aliases = dir.path().join("tool_defs/_aliases.yaml");
    std::fs::remove_file(&aliases).unwrap();
    std::fs::create_dir(&aliases).unwrap();

    let failed = runtime.execute("registry.remove", json!({"name": "demo.hello"})).await;
    assert!(!failed.is_success());
    assert!(runtime.store().exists("demo.hello").await);
    assert_eq!(
        runtime.store().canonical_name("demo.hi").await.as_deref(),
        Some("demo.hello")
    );
    assert!(dir.path().join("tool_defs/demo/hello.yaml").is_file());
}

#[tokio::test]
async fn test_builtins_cannot_be_removed() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    assert_eq!(
        kind(&runtime, "registry.remove", json!({"name": "registry.list"})).await,
        ToolErrorKind::InvalidSchema
    );
    assert!(runtime.store().exists("registry.list").await);
}

#[tokio::test]
async fn test_list_groups_by_namespace() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let out = text(&runtime, "registry.list", json!({})).await;
    assert!(out.starts_with("tools:\n"));
    assert!(out.contains("\n  observe:\n    log: Append a structured entry"));
    assert!(out.contains("\n  registry:\n"));
}

#[tokio::test]
async fn test_execute_reaches_non_entry_tools() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;

    let out = text(
        &runtime,
        "registry.execute",
        json!({"name": "mcp.list", "params": "{}"}),
    )
    .await;
    assert!(out.starts_with("No external MCP servers configured."));

    // Inner failures keep their kind
    assert_eq!(
        kind(&runtime, "registry.execute", json!({"name": "nope.missing"})).await,
        ToolErrorKind::NotFound
    );
    assert_eq!(
        kind(
            &runtime,
            "registry.execute",
            json!({"name": "registry.remove", "params": {}})
        )
        .await,
        ToolErrorKind::MissingParameter
    );
}

#[tokio::test]
async fn test_alias_is_persisted() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;

    let out = text(
        &runtime,
        "registry.execute",
        json!({"name": "registry.alias", "params": {"alias": "ls.all", "target": "registry.list"}}),
    )
    .await;
    assert_eq!(out, "Added alias: ls.all -> registry.list");
    assert!(text(&runtime, "ls.all", json!({})).await.starts_with("tools:"));

    let aliases = std::fs::read_to_string(dir.path().join("tool_defs/_aliases.yaml")).unwrap();
    assert!(aliases.contains("ls.all"));
}

#[tokio::test]
async fn test_reload_reports_counts() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    text(&runtime, "registry.list", json!({})).await;

    let out = text(&runtime, "registry.reload", json!({})).await;
    assert!(out.starts_with("## Cache Cleared"));
    assert!(out.contains("**Local tools**: Cleared 1 modules."));
    assert!(out.contains("Reloaded configs (0 servers configured)"));
}

#[tokio::test]
async fn test_validate_reports_tool_count() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let out = text(&runtime, "registry.validate", json!({})).await;
    assert!(!out.is_empty());
}

#[tokio::test]
async fn test_log_appends_jsonl() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let args = json!({
        "file": "logs/decisions.jsonl",
        "category": "decision",
        "message": "Use sqlite",
        "metadata": r#"{"confidence": 0.8}"#,
    });

    runtime.execute("observe.log", args.clone()).await.into_result().unwrap();
    let second = runtime.execute("observe.log", args).await.into_result().unwrap();
    assert_eq!(second["entry_count"], 2);
    assert_eq!(second["logged"], true);

    let contents = std::fs::read_to_string(dir.path().join("logs/decisions.jsonl")).unwrap();
    let first: Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(first["category"], "decision");
    assert_eq!(first["metadata"]["confidence"], 0.8);
    assert!(first["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_trace_call_start_and_end() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let file = dir.path().join("trace.jsonl");
    let file = file.to_str().unwrap();

    let start = runtime
        .execute(
            "observe.trace-call",
            json!({"file": file, "tool_name": "git.status", "phase": "start", "data": {"path": "."}}),
        )
        .await
        .into_result()
        .unwrap();
    let trace_id = start["trace_id"].as_str().unwrap().to_string();
    assert_eq!(trace_id.len(), 8);

    let end = runtime
        .execute(
            "observe.trace-call",
            json!({"file": file, "tool_name": "git.status", "phase": "end", "trace_id": trace_id}),
        )
        .await
        .into_result()
        .unwrap();
    assert!(end["duration_ms"].is_i64());

    let lines: Vec<Value> = std::fs::read_to_string(file)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["params"]["path"], ".");
    assert_eq!(lines[1]["phase"], "end");

    let missing = runtime
        .execute(
            "observe.trace-call",
            json!({"file": file, "tool_name": "x", "phase": "end"}),
        )
        .await;
    assert_eq!(missing.error_kind(), Some(ToolErrorKind::Execution));

    let invalid = runtime
        .execute(
            "observe.trace-call",
            json!({"file": file, "tool_name": "x", "phase": "middle"}),
        )
        .await;
    assert_eq!(
        invalid.get_error().unwrap().message,
        "Invalid phase: middle. Use 'start' or 'end'."
    );
}

#[tokio::test]
async fn test_session_checkpoint() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let out = runtime
        .execute(
            "observe.session",
            json!({"checkpoint_dir": "checkpoints", "checkpoint_name": "before deploy", "state": {"step": 3}}),
        )
        .await
        .into_result()
        .unwrap();

    let file = out["file"].as_str().unwrap();
    assert!(file.ends_with("_before_deploy.json"));
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(saved["checkpoint"], "before deploy");
    assert_eq!(saved["state"]["step"], 3);
}

#[tokio::test]
async fn test_mcp_server_lifecycle() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let exec = |name: &str, params: Value| json!({"name": name, "params": params});

    let out = text(
        &runtime,
        "registry.execute",
        exec(
            "mcp.add",
            json!({"name": "tracker", "command": "tracker-mcp", "args": ["--stdio"], "env": {"TOKEN": "${TRACKER_TOKEN}"}}),
        ),
    )
    .await;
    assert!(out.starts_with("Added MCP server: tracker"));
    assert!(out.contains("Command: tracker-mcp --stdio"));
    assert!(out.contains("Environment: TOKEN"));
    assert!(dir.path().join("tool_defs/_servers/tracker.yaml").is_file());

    assert_eq!(
        kind(
            &runtime,
            "registry.execute",
            exec("mcp.add", json!({"name": "tracker", "command": "other"}))
        )
        .await,
        ToolErrorKind::DuplicateName
    );

    let out = text(&runtime, "registry.execute", exec("mcp.connect", json!({"name": "tracker"}))).await;
    assert!(out.starts_with("## Connected to tracker"));
    assert!(out.contains("Discovered 1 tools:"));
    assert!(out.contains("- `search_issues`: Search issues"));

    let def = runtime.store().find("tracker.search_issues").await.unwrap();
    assert!(def.parameters[0].required);
    let result = text(&runtime, "tracker.search_issues", json!({"query": "bug"})).await;
    assert_eq!(result, r#"search_issues <- {"query":"bug"}"#);

    let list = text(&runtime, "registry.execute", exec("mcp.list", json!({}))).await;
    assert!(list.contains("### tracker\nCommand: `tracker-mcp --stdio`"));
    assert!(list.contains("Status: connected"));

    let out = text(&runtime, "registry.execute", exec("mcp.disconnect", json!({"name": "tracker"}))).await;
    assert_eq!(out, "Disconnected from tracker.");
    let out = text(&runtime, "registry.execute", exec("mcp.disconnect", json!({"name": "tracker"}))).await;
    assert_eq!(out, "Server 'tracker' is not connected.");

    let out = text(&runtime, "registry.execute", exec("mcp.remove", json!({"name": "tracker"}))).await;
    assert!(out.starts_with("Removed MCP server: tracker"));
    assert!(!runtime.store().exists("tracker.search_issues").await);
    assert!(!dir.path().join("tool_defs/_servers/tracker.yaml").exists());

    let missing = runtime
        .execute("registry.execute", exec("mcp.remove", json!({"name": "tracker"})))
        .await;
    assert_eq!(
        missing.get_error().unwrap().message,
        "MCP server 'tracker' not found. Available: none"
    );
}

#[tokio::test]
async fn test_mcp_connect_keeps_local_tools_in_server_namespace() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let exec = |name: &str, params: Value| json!({"name": name, "params": params});

    text(
        &runtime,
        "registry.execute",
        exec("mcp.add", json!({"name": "github", "command": "github-mcp"})),
    )
    .await;
    text(
        &runtime,
        "registry.add",
        json!({"name": "github.summary", "description": "Summarise open PRs"}),
    )
    .await;

    text(&runtime, "registry.execute", exec("mcp.connect", json!({"name": "github"}))).await;
    assert!(runtime.store().exists("github.summary").await);
    assert!(runtime.store().exists("github.search_issues").await);

    text(&runtime, "registry.execute", exec("mcp.remove", json!({"name": "github"}))).await;
    assert!(runtime.store().exists("github.summary").await);
    assert!(!runtime.store().exists("github.search_issues").await);
    assert!(dir.path().join("tool_defs/github/summary.yaml").is_file());
}

#[tokio::test]
async fn test_mcp_inspect() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&dir).await;
    let exec = |params: Value| json!({"name": "mcp.inspect", "params": params});

    let own = text(&runtime, "registry.execute", exec(json!({}))).await;
    assert!(own.starts_with("## MCP Inspector for toolsmith"));
    assert!(own.contains(
        "npx -y @modelcontextprotocol/inspector toolsmith --tool-defs tool_defs serve"
    ));
    assert!(own.contains("`http://localhost:6274`"));

    let custom = text(&runtime, "registry.execute", exec(json!({"command": "uvx my-server"}))).await;
    assert!(custom.starts_with("## MCP Inspector for custom"));
    assert!(custom.contains("@modelcontextprotocol/inspector uvx my-server"));

    text(
        &runtime,
        "registry.execute",
        json!({"name": "mcp.add", "params": {
            "name": "tracker",
            "command": "tracker-mcp",
            "args": ["--stdio"],
            "env": {"TOKEN": "${TRACKER_TOKEN}"}
        }}),
    )
    .await;
    let configured = text(&runtime, "registry.execute", exec(json!({"server": "tracker"}))).await;
    assert!(configured.starts_with("## MCP Inspector for tracker"));
    assert!(configured.contains(
        r#"@modelcontextprotocol/inspector -e TOKEN="${TRACKER_TOKEN}" tracker-mcp --stdio"#
    ));

    let missing = runtime
        .execute("registry.execute", exec(json!({"server": "ghost"})))
        .await;
    assert_eq!(missing.error_kind(), Some(ToolErrorKind::NotFound));
    assert_eq!(
        missing.get_error().unwrap().message,
        "MCP server 'ghost' not found. Available: tracker"
    );
}

