use super::*;
use crate::error::ToolsmithError;
use serde_json::json;

fn echo_definition(name: &str) -> ToolDefinition {
    ToolDefinition::new(name, "Echo the message back")
        .with_module("tools/demo/echo.sh")
        .with_function("echo")
        .with_parameter(ToolParameter::required(
            "message",
            ParamType::String,
            "Text to echo",
        ))
}

#[test]
fn test_derived_names() {
    let def = ToolDefinition::new("git.update-prs", "Update PRs\nLonger text");
    assert_eq!(def.namespace(), "git");
    assert_eq!(def.tool_name(), "update-prs");
    assert_eq!(def.function_name(), "update_prs");
    assert_eq!(def.short_description(), "Update PRs");

    let nested = ToolDefinition::new("ns.pull-requests.open", "Open a PR");
    assert_eq!(nested.tool_name(), "pull-requests.open");
    assert_eq!(nested.function_name(), "pull_requests_open");
}

#[test]
fn test_short_description_truncates() {
    let def = ToolDefinition::new("a.b", "x".repeat(100));
    assert_eq!(def.short_description().chars().count(), 60);
}

#[test]
fn test_dispatch_target() {
    let local = echo_definition("demo.echo");
    assert_eq!(
        local.dispatch(),
        DispatchTarget::Local {
            module: "tools/demo/echo.sh".into(),
            function: "echo".into()
        }
    );

    let remote = ToolDefinition::new("github.search", "")
        .with_module("mcp://github")
        .with_function("search_code");
    assert_eq!(
        remote.dispatch(),
        DispatchTarget::Remote {
            namespace: "github".into(),
            tool: "search_code".into()
        }
    );

    let implicit = ToolDefinition::new("github.list_issues", "").with_module("mcp://github");
    assert!(matches!(
        implicit.dispatch(),
        DispatchTarget::Remote { tool, .. } if tool == "list_issues"
    ));
}

#[test]
fn test_param_type_parsing() {
    let param: ToolParameter =
        serde_yaml::from_str("name: count\ntype: integer\nrequired: false\ndefault: 3").unwrap();
    assert_eq!(param.param_type, ParamType::Integer);
    assert!(!param.required);
    assert_eq!(param.default, Some(json!(3)));

    let param: ToolParameter = serde_yaml::from_str("name: x\ntype: float").unwrap();
    assert_eq!(param.param_type, ParamType::Unknown("float".into()));
    assert!(param.required);

    let param: ToolParameter = serde_yaml::from_str("name: y").unwrap();
    assert_eq!(param.param_type, ParamType::String);
}

#[test]
fn test_param_type_matches_strictly() {
    assert!(ParamType::String.matches(&json!("5")));
    assert!(!ParamType::Number.matches(&json!("5")));
    assert!(ParamType::Integer.matches(&json!(5)));
    assert!(ParamType::Integer.matches(&json!(5.0)));
    assert!(!ParamType::Integer.matches(&json!(5.5)));
    assert!(ParamType::Number.matches(&json!(5.5)));
    assert!(!ParamType::Boolean.matches(&json!("true")));
    assert!(ParamType::Any.matches(&json!(null)));
}

#[test]
fn test_admission_collects_every_problem() {
    let def = ToolDefinition::new("nonamespace", "bad")
        .with_parameter(ToolParameter::required("a", ParamType::from("float"), ""))
        .with_parameter(ToolParameter::required("a", ParamType::String, ""))
        .with_parameter(ToolParameter::required("", ParamType::String, ""))
        .with_parameter(ToolParameter::required("b", ParamType::String, "").with_default(json!("x")));

    let errors = Validator::new().admission_errors(&def);
    assert_eq!(errors.len(), 5, "{errors:?}");
    assert!(errors[0].contains("namespace.tool-name"));
}

#[test]
fn test_dotted_name_shape() {
    assert!(is_dotted_name("git.commit"));
    assert!(is_dotted_name("mcp.tool-with.dots"));
    assert!(!is_dotted_name("git"));
    assert!(!is_dotted_name(".commit"));
    assert!(!is_dotted_name("git."));
    assert!(!is_dotted_name("git commit.x"));
}

#[test]
fn test_report_format_clean() {
    let report = ValidationReport::new(3);
    assert_eq!(report.format(), "Validated 3 tools\n\n✓ No issues found");
}

#[test]
fn test_report_format_with_findings() {
    let mut report = ValidationReport::new(2);
    report.error("a.b: Missing 'module' field");
    report.warning("a.c: Missing description");

    assert_eq!(
        report.format(),
        "Validated 2 tools\n\nErrors (1):\n  ✗ a.b: Missing 'module' field\n\nWarnings (1):\n  ⚠ a.c: Missing description"
    );
    assert!(!report.is_valid());
}

#[test]
fn test_input_schema() {
    let def = echo_definition("demo.echo").with_parameter(
        ToolParameter::optional("times", ParamType::Integer, "").with_default(json!(1)),
    );
    let schema = input_schema(&def);

    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["message"]["type"], "string");
    assert_eq!(schema["properties"]["times"]["default"], 1);
    assert_eq!(schema["required"], json!(["message"]));
}

#[test]
fn test_parameters_from_schema() {
    let schema = json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Search text"},
            "limit": {"type": "integer", "default": 10},
            "filter": {"type": ["string", "null"]},
            "opts": {}
        },
        "required": ["query"]
    });

    let params = parameters_from_schema(&schema);
    let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["filter", "limit", "opts", "query"]);
    assert_eq!(params[0].param_type, ParamType::Any);
    assert_eq!(params[1].default, Some(json!(10)));
    assert_eq!(params[2].param_type, ParamType::Any);
    assert!(params[3].required);
    assert_eq!(params[3].description, "Search text");
}

#[tokio::test]
async fn test_add_then_find() {
    let store = DefinitionStore::new();
    let def = echo_definition("demo.echo");
    store.add(def.clone()).await.unwrap();

    let found = store.find("demo.echo").await.unwrap();
    assert_eq!(*found, def);
    assert!(store.exists("demo.echo").await);
}

#[tokio::test]
async fn test_add_duplicate_leaves_store_unchanged() {
    let store = DefinitionStore::new();
    store.add(echo_definition("demo.echo")).await.unwrap();

    let replacement = ToolDefinition::new("demo.echo", "different");
    let err = store.add(replacement).await.unwrap_err();
    assert!(matches!(err, ToolsmithError::DuplicateName(name) if name == "demo.echo"));
    assert_eq!(
        store.find("demo.echo").await.unwrap().description,
        "Echo the message back"
    );
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_add_invalid_schema() {
    let store = DefinitionStore::new();
    let def = ToolDefinition::new("demo.bad", "")
        .with_parameter(ToolParameter::required("x", ParamType::from("decimal"), ""));

    let err = store.add(def).await.unwrap_err();
    assert!(matches!(err, ToolsmithError::InvalidSchema(ref p) if p.len() == 1));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_remove_twice() {
    let store = DefinitionStore::new();
    store.add(echo_definition("demo.echo")).await.unwrap();

    store.remove("demo.echo").await.unwrap();
    let err = store.remove("demo.echo").await.unwrap_err();
    assert!(matches!(err, ToolsmithError::NotFound(_)));
}

#[tokio::test]
async fn test_update_merges_and_revalidates() {
    let store = DefinitionStore::new();
    store.add(echo_definition("demo.echo")).await.unwrap();

    let patch = DefinitionPatch {
        description: Some("Echo loudly".into()),
        ..Default::default()
    };
    let updated = store.update("demo.echo", &patch).await.unwrap();
    assert_eq!(updated.description, "Echo loudly");
    assert_eq!(updated.parameters.len(), 1);

    let bad = DefinitionPatch {
        parameters: Some(vec![ToolParameter::required("", ParamType::String, "")]),
        ..Default::default()
    };
    assert!(matches!(
        store.update("demo.echo", &bad).await,
        Err(ToolsmithError::InvalidSchema(_))
    ));
    assert_eq!(store.find("demo.echo").await.unwrap().parameters.len(), 1);

    assert!(matches!(
        store.update("demo.missing", &patch).await,
        Err(ToolsmithError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_by_namespace_sorted() {
    let store = DefinitionStore::new();
    for name in ["zeta.b", "alpha.z", "alpha.a", "alpha-x.c"] {
        store.add(echo_definition(name)).await.unwrap();
    }

    let groups: Vec<(String, Vec<String>)> = store
        .by_namespace()
        .await
        .map(|(ns, defs)| (ns, defs.iter().map(|d| d.name.clone()).collect()))
        .collect();

    assert_eq!(
        groups,
        vec![
            ("alpha".to_string(), vec!["alpha.a".to_string(), "alpha.z".to_string()]),
            ("alpha-x".to_string(), vec!["alpha-x.c".to_string()]),
            ("zeta".to_string(), vec!["zeta.b".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_alias_resolution_and_cleanup() {
    let store = DefinitionStore::new();
    store.add(echo_definition("demo.echo")).await.unwrap();

    store.add_alias("demo.say", "demo.echo").await.unwrap();
    assert_eq!(store.find("demo.say").await.unwrap().name, "demo.echo");
    assert_eq!(store.canonical_name("demo.say").await.as_deref(), Some("demo.echo"));

    assert!(matches!(
        store.add_alias("demo.say", "demo.echo").await,
        Err(ToolsmithError::DuplicateName(_))
    ));
    assert!(matches!(
        store.add_alias("demo.echo", "demo.echo").await,
        Err(ToolsmithError::DuplicateName(_))
    ));
    assert!(matches!(
        store.add_alias("demo.ghost", "demo.nothing").await,
        Err(ToolsmithError::NotFound(_))
    ));
    assert!(matches!(
        store.add_alias("nodot", "demo.echo").await,
        Err(ToolsmithError::InvalidSchema(_))
    ));

    // An alias name blocks a definition of the same name
    assert!(matches!(
        store.add(echo_definition("demo.say")).await,
        Err(ToolsmithError::DuplicateName(_))
    ));

    store.remove("demo.echo").await.unwrap();
    assert!(store.aliases().await.is_empty());
    assert!(store.find("demo.say").await.is_none());
}

fn remote_definition(name: &str) -> ToolDefinition {
    let (server, tool) = name.split_once('.').unwrap();
    ToolDefinition::new(name, "Imported tool")
        .with_module(format!("mcp://{}", server))
        .with_function(tool)
}

#[tokio::test]
async fn test_replace_server_tools_swaps_atomically() {
    let store = DefinitionStore::new();
    store.add(remote_definition("remote.old")).await.unwrap();
    store.add(remote_definition("remote.kept")).await.unwrap();
    store.add(echo_definition("local.tool")).await.unwrap();
    store.add_alias("remote.legacy", "remote.old").await.unwrap();
    store.add_alias("remote.k", "remote.kept").await.unwrap();

    let result = store
        .replace_server_tools(
            "remote",
            vec![remote_definition("remote.kept"), remote_definition("remote.new")],
        )
        .await
        .unwrap();

    assert_eq!(result.removed, 2);
    assert_eq!(result.added, 2);
    assert_eq!(result.dropped_aliases, vec!["remote.legacy".to_string()]);
    assert!(store.exists("remote.new").await);
    assert!(!store.exists("remote.old").await);
    assert!(store.exists("remote.k").await);
    assert!(store.exists("local.tool").await);
}

#[tokio::test]
async fn test_replace_server_tools_all_or_nothing() {
    let store = DefinitionStore::new();
    store.add(remote_definition("remote.old")).await.unwrap();

    let err = store
        .replace_server_tools(
            "remote",
            vec![remote_definition("remote.fine"), remote_definition("other.stray")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ToolsmithError::InvalidSchema(_)));
    assert!(store.exists("remote.old").await);
    assert!(!store.exists("remote.fine").await);
}

#[tokio::test]
async fn test_replace_server_tools_keeps_local_tools_in_namespace() {
    let store = DefinitionStore::new();
    store.add(echo_definition("github.summary")).await.unwrap();
    store.add(remote_definition("github.search")).await.unwrap();

    let result = store
        .replace_server_tools("github", vec![remote_definition("github.issues")])
        .await
        .unwrap();
    assert_eq!(result.removed, 1);
    assert!(store.exists("github.summary").await);
    assert!(store.exists("github.issues").await);
    assert!(!store.exists("github.search").await);

    // A remote tool may not shadow a local one
    let err = store
        .replace_server_tools("github", vec![remote_definition("github.summary")])
        .await
        .unwrap_err();
    assert!(matches!(err, ToolsmithError::InvalidSchema(ref p) if p[0].contains("local tool")));
    assert!(store.find("github.summary").await.unwrap().module.ends_with(".sh"));
    assert!(store.exists("github.issues").await);

    store.replace_server_tools("github", Vec::new()).await.unwrap();
    assert!(store.exists("github.summary").await);
    assert!(!store.exists("github.issues").await);
}

#[tokio::test]
async fn test_seed_skips_rejected() {
    let store = DefinitionStore::new();
    let rejected = store
        .seed(
            vec![echo_definition("a.one"), echo_definition("bad"), echo_definition("a.one")],
            vec![ToolAlias::new("a.uno", "a.one"), ToolAlias::new("a.dos", "a.two")],
        )
        .await;

    assert_eq!(store.len().await, 1);
    assert_eq!(rejected.len(), 3, "{rejected:?}");
    assert!(store.exists("a.uno").await);
}

#[tokio::test]
async fn test_validate_all_reports_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let store = DefinitionStore::with_validator(Validator::new().with_project_root(dir.path()));
    store
        .add(ToolDefinition::new("demo.quiet", "").with_module("tools/demo/quiet.sh").with_function("quiet"))
        .await
        .unwrap();
    store
        .add(ToolDefinition::new("demo.builtin", "ok").with_module("builtin:registry").with_function("list"))
        .await
        .unwrap();

    let report = store.validate_all().await;
    assert_eq!(report.tool_count, 2);
    assert!(report.is_valid());
    assert_eq!(
        report.warnings,
        vec![
            "demo.quiet: Missing description".to_string(),
            "demo.quiet: Module not found: tools/demo/quiet.sh".to_string(),
        ]
    );
}
