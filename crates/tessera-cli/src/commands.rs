use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};
use tessera_model::{Config, Data, FieldKind, Instance, ListItem, ModelDefinition, ModelList};
use tessera_store::{Store, StoreConfig};
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let store = Store::with_config(settings);
    match cli.command {
        Command::Inspect(args) => cmd_inspect(&store, args, &cli.format),
        Command::Normalize(args) => cmd_normalize(&store, args, &cli.format).await,
        Command::List(args) => cmd_list(&store, args, &cli.format),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_definition(args: &ShapeArgs) -> anyhow::Result<ModelDefinition> {
    let shape = read_json(&args.shape)?;
    let definition = ModelDefinition::from_shape_named(args.name.as_str(), shape)
        .with_context(|| format!("shape {}", args.shape.display()))?;
    debug!(model = definition.name(), fields = definition.fields().len(), "loaded shape");
    Ok(definition)
}

fn cmd_inspect(store: &Store, args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let definition = load_definition(&args.shape)?;
    let config = store.config(&definition)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&describe_config(&config))?),
        OutputFormat::Text => print_config(&config, 0),
    }
    Ok(())
}

async fn cmd_normalize(store: &Store, args: NormalizeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let definition = load_definition(&args.shape)?;
    let data = args.data.as_deref().map(read_json).transpose()?;
    let updates = args
        .update
        .iter()
        .map(|path| read_json(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let instance = normalize(store, &definition, data, updates).await?;

    match (format, &instance) {
        (OutputFormat::Json, Some(instance)) => {
            println!("{}", serde_json::to_string_pretty(instance)?)
        }
        (OutputFormat::Json, None) => println!("null"),
        (OutputFormat::Text, Some(instance)) => print_instance(&definition, instance),
        (OutputFormat::Text, None) => println!("{} {} deleted", "✗".red(), definition.name().bold()),
    }
    Ok(())
}

/// Store `data` as a new instance, then apply each update to the latest
/// version.
pub async fn normalize(
    store: &Store,
    definition: &ModelDefinition,
    data: Option<Value>,
    updates: Vec<Value>,
) -> anyhow::Result<Option<Instance>> {
    let data = data.map_or_else(Data::empty, Data::from);
    let mut current = store.set(definition, data)?.await?;
    for update in updates {
        let Some(instance) = current else {
            anyhow::bail!("cannot update {}: it was deleted", definition.name());
        };
        current = store.set(&instance, update)?.await?;
    }
    Ok(current)
}

fn cmd_list(store: &Store, args: ListArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let definition = load_definition(&args.shape)?;
    let items = match read_json(&args.items)? {
        Value::Array(items) => items.into_iter().map(Data::from).collect(),
        other => anyhow::bail!("{} must hold an array, found {}", args.items.display(), Data::from(other).kind_name()),
    };
    let list = store.create_list(&definition, items)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&list_json(store, &list)?)?),
        OutputFormat::Text => {
            println!("{} {} item(s)", definition.name().bold(), list.len());
            for item in &list {
                match item {
                    ListItem::Model(instance) => println!("  {}", instance.to_json()),
                    ListItem::Ref(reference) => println!(
                        "  {} {}#{}",
                        "→".cyan(),
                        reference.definition().name(),
                        reference.id().yellow()
                    ),
                }
            }
        }
    }
    Ok(())
}

/// JSON view of a list with references resolved through the store.
pub fn list_json(store: &Store, list: &ModelList) -> anyhow::Result<Value> {
    list.iter()
        .map(|item| {
            let entry = store.resolve_item(item)?;
            Ok(entry.instance().map_or(Value::Null, Instance::to_json))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(Value::Array)
}

pub fn describe_kind(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Id => "id".into(),
        FieldKind::Computed(_) => "computed".into(),
        FieldKind::Primitive { kind, default } => format!("{kind} (default {default})"),
        FieldKind::Primitives { kind, default } => {
            format!("[{kind}] ({} default item(s))", default.len())
        }
        FieldKind::Model(config) => format!("{} ({})", config.definition().name(), linkage(config)),
        FieldKind::Models { list, defaults } => format!(
            "[{}] ({}, {} default item(s))",
            list.definition().name(),
            linkage(list.element()),
            defaults.len()
        ),
    }
}

fn linkage(config: &Config) -> &'static str {
    if config.is_external() {
        "reference"
    } else {
        "embedded"
    }
}

pub fn describe_config(config: &Config) -> Value {
    let fields: Vec<Value> = config
        .fields()
        .iter()
        .map(|field| {
            let mut entry = json!({ "key": field.key(), "kind": describe_kind(field.kind()) });
            match field.kind() {
                FieldKind::Model(nested) => entry["model"] = describe_config(nested),
                FieldKind::Models { list, .. } => entry["model"] = describe_config(list.element()),
                _ => {}
            }
            entry
        })
        .collect();
    json!({
        "name": config.definition().name(),
        "external": config.is_external(),
        "connected": config.connection().is_some(),
        "fields": fields,
    })
}

fn print_config(config: &Config, depth: usize) {
    let indent = "  ".repeat(depth);
    if depth == 0 {
        println!("{} ({})", config.definition().name().bold(), linkage(config));
    }
    for field in config.fields() {
        println!("{indent}  {}: {}", field.key().cyan(), describe_kind(field.kind()));
        match field.kind() {
            FieldKind::Model(nested) => print_config(nested, depth + 1),
            FieldKind::Models { list, .. } => print_config(list.element(), depth + 1),
            _ => {}
        }
    }
}

fn print_instance(definition: &ModelDefinition, instance: &Instance) {
    println!(
        "{} {} {}",
        "✓".green().bold(),
        definition.name().bold(),
        instance.id().unwrap_or("(singleton)").yellow()
    );
    if let Value::Object(fields) = instance.to_json() {
        for (key, value) in fields {
            println!("  {}: {}", key.cyan(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn todo() -> ModelDefinition {
        ModelDefinition::from_shape_named(
            "Todo",
            json!({
                "id": true,
                "title": "untitled",
                "done": false,
                "tags": ["misc"],
                "owner": { "id": true, "name": "" },
                "notes": [{ "text": "" }],
            }),
        )
        .unwrap()
    }

    #[test]
    fn describes_every_field() {
        let store = Store::new();
        let config = store.config(&todo()).unwrap();
        let described = describe_config(&config);

        assert_eq!(described["name"], "Todo");
        assert_eq!(described["external"], true);
        let kinds: Vec<_> = described["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["kind"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            kinds,
            [
                "id",
                "string (default untitled)",
                "boolean (default false)",
                "[string] (1 default item(s))",
                "owner (reference)",
                "[notes] (embedded, 1 default item(s))",
            ]
        );
        assert_eq!(described["fields"][4]["model"]["fields"][1]["key"], "name");
    }

    #[tokio::test]
    async fn normalize_applies_updates_in_order() {
        let store = Store::new();
        let definition = todo();
        let instance = normalize(
            &store,
            &definition,
            Some(json!({ "title": "write docs", "owner": { "id": "u1", "name": "Ann" } })),
            vec![json!({ "done": "yes" }), json!({ "title": "ship" })],
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(instance.string("title"), Some("ship"));
        assert_eq!(instance.boolean("done"), Some(true));
        let owner = store.resolve(instance.reference("owner").unwrap()).unwrap();
        assert_eq!(owner.instance().unwrap().string("name"), Some("Ann"));
    }

    #[tokio::test]
    async fn updates_after_a_delete_fail() {
        let store = Store::new();
        let result = normalize(&store, &todo(), None, vec![Value::Null, json!({ "title": "x" })]).await;
        assert!(result.unwrap_err().to_string().contains("deleted"));
    }

    #[test]
    fn lists_resolve_references() {
        let store = Store::new();
        let owner = ModelDefinition::from_shape_named("Owner", json!({ "id": true, "name": "" })).unwrap();
        let list = store
            .create_list(
                &owner,
                vec![Data::from(json!({ "id": "a", "name": "Ann" })), Data::from("b")],
            )
            .unwrap();

        let resolved = list_json(&store, &list).unwrap();
        assert_eq!(resolved[0]["name"], "Ann");
        assert_eq!(resolved[1], Value::Null);
    }

    #[test]
    fn shapes_are_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "id": true, "title": "" }}"#).unwrap();
        let args = ShapeArgs {
            shape: file.path().to_path_buf(),
            name: "Todo".into(),
        };
        let definition = load_definition(&args).unwrap();
        assert_eq!(definition.name(), "Todo");
        assert!(definition.has_id());

        let missing = ShapeArgs {
            shape: file.path().with_extension("missing"),
            name: "Todo".into(),
        };
        assert!(load_definition(&missing).is_err());
    }
}
