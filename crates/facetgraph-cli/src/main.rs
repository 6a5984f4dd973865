//! Facetgraph CLI - browse and edit a personal knowledge graph

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use facetgraph_core::config::Config;
use facetgraph_core::domain::{
    Aggregate, Category, CategoryId, Entity, FacetProperty, PropertyType, Relationship,
    RelationshipId, Tag, Tagged,
};
use facetgraph_core::model::Model;
use facetgraph_core::query::QueryCallbacks;
use facetgraph_core::repository::Repository;
use futures_util::TryStreamExt;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facetgraph")]
#[command(author, version, about = "Personal knowledge graph of tagged entities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (defaults to storage.path from the config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tags
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Manage entities
    Entities {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Manage relationships
    Relationships {
        #[command(subcommand)]
        action: RelationshipAction,
    },

    /// Manage the category tree
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// List everything carrying any of the given tags
    Query {
        /// Tag names
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// List all tags
    List,
    /// Create a tag
    Add { name: String },
    /// Delete a tag
    Remove { name: String },
    /// Declare a facet property on a tag
    Property {
        /// Tag name
        name: String,
        /// Property name
        property: String,
        /// Property type (string, long, double, decimal, bool, guid, datetime)
        property_type: String,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// List entities
    List {
        /// Only entities directly under this category path
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Create an entity
    Add {
        name: String,
        /// Category path, e.g. people/friends
        #[arg(short, long)]
        category: Option<String>,
        /// Tag names to assign
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Delete an entity
    Remove {
        name: String,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Assign a tag to an entity
    Tag {
        name: String,
        tag: String,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Set a facet property value on an entity
    Set {
        name: String,
        property: String,
        value: String,
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(Subcommand)]
enum RelationshipAction {
    /// List all relationships
    List,
    /// Connect two uncategorized or uniquely named entities
    Add {
        name: String,
        from: String,
        to: String,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Delete a relationship by id
    Remove { id: String },
}

#[derive(Subcommand)]
enum CategoryAction {
    /// Print the category tree
    Tree,
    /// Create a category path, including missing parents
    Add { path: String },
    /// Copy a category subtree below another category
    Copy { src: String, dst: String },
    /// Delete a category
    Remove {
        path: String,
        /// Delete sub-categories and entities too
        #[arg(short, long)]
        recursive: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.logging.filter))?,
        )
        .init();

    let output = Output {
        format: cli.format,
        quiet: cli.quiet,
    };

    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, output),
        command => command,
    };

    let mut db_config = config.storage.database_config();
    if let Some(path) = cli.database {
        db_config.path = path;
    }
    debug!(path = %db_config.path.display(), "Opening database");
    let model = Model::open(db_config).await?;

    let result = match command {
        Commands::Tags { action } => cmd_tags(&model, action, output).await,
        Commands::Entities { action } => cmd_entities(&model, action, output).await,
        Commands::Relationships { action } => cmd_relationships(&model, action, output).await,
        Commands::Categories { action } => cmd_categories(&model, action, output).await,
        Commands::Query { tags } => cmd_query(&model, &tags, output).await,
        Commands::Config { .. } => Ok(()),
    };

    model.close().await;
    result
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print a confirmation line unless quiet or emitting JSON
    fn note(&self, message: impl AsRef<str>) {
        if !self.quiet && !self.json() {
            println!("{}", message.as_ref());
        }
    }

    fn emit(&self, value: &serde_json::Value) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

async fn cmd_tags(model: &Model, action: TagAction, output: Output) -> anyhow::Result<()> {
    match action {
        TagAction::List => {
            let tags: Vec<Tag> = model.tags().find_all().try_collect().await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&tags)?);
            }
            if tags.is_empty() {
                output.note("No tags found.");
            }
            for tag in tags {
                let properties: Vec<String> = tag
                    .facet
                    .properties()
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.property_type))
                    .collect();
                if properties.is_empty() {
                    println!("{}", tag.name);
                } else {
                    println!("{} ({})", tag.name, properties.join(", "));
                }
            }
        }
        TagAction::Add { name } => {
            let tag = model.tags().upsert(&Tag::new(&name)).await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&tag)?);
            }
            output.note(format!("Tag '{}' created.", name));
        }
        TagAction::Remove { name } => {
            let tag = tag_by_name(model, &name).await?;
            model.delete_tag(&tag).await?;
            output.note(format!("Tag '{}' deleted.", name));
        }
        TagAction::Property {
            name,
            property,
            property_type,
        } => {
            let property_type = PropertyType::parse(&property_type).ok_or_else(|| {
                anyhow!(
                    "Unknown property type '{}'. Expected one of: {}",
                    property_type,
                    PropertyType::all()
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;
            let mut tag = tag_by_name(model, &name).await?;
            tag.facet_mut()
                .add_property(FacetProperty::new(&property, property_type))?;
            model.tags().upsert(&tag).await?;
            output.note(format!(
                "Property '{}' ({}) added to tag '{}'.",
                property, property_type, name
            ));
        }
    }
    Ok(())
}

async fn cmd_entities(model: &Model, action: EntityAction, output: Output) -> anyhow::Result<()> {
    match action {
        EntityAction::List { category } => {
            let entities: Vec<Entity> = match category {
                Some(path) => {
                    let category = category_at(model, &path).await?;
                    model.entities().find_by_category(Some(category.id)).await?
                }
                None => model.entities().find_all().try_collect().await?,
            };
            if output.json() {
                return output.emit(&serde_json::to_value(&entities)?);
            }
            if entities.is_empty() {
                output.note("No entities found.");
            }
            for entity in entities {
                println!("{}", describe_entity(model, &entity).await?);
            }
        }
        EntityAction::Add {
            name,
            category,
            tags,
        } => {
            let mut entity = Entity::new(&name);
            if let Some(path) = category {
                entity.category = Some(category_at(model, &path).await?.id);
            }
            for tag in &tags {
                entity.add_tag(tag_by_name(model, tag).await?);
            }
            let entity = model.entities().upsert(&entity).await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&entity)?);
            }
            output.note(format!("Entity '{}' created.", name));
        }
        EntityAction::Remove { name, category } => {
            let entity = entity_in(model, &name, category.as_deref()).await?;
            if model.entities().delete(&entity).await? {
                output.note(format!("Entity '{}' deleted.", name));
            } else {
                let relationships = model.entities().reference_count(entity.id).await?;
                return Err(anyhow!(
                    "Entity '{}' is still referenced by {} relationship(s). Remove them first.",
                    name,
                    relationships
                ));
            }
        }
        EntityAction::Tag {
            name,
            tag,
            category,
        } => {
            let mut entity = entity_in(model, &name, category.as_deref()).await?;
            if entity.add_tag(tag_by_name(model, &tag).await?) {
                model.entities().upsert(&entity).await?;
                output.note(format!("Tagged '{}' with '{}'.", name, tag));
            } else {
                output.note(format!("'{}' already carries '{}'.", name, tag));
            }
        }
        EntityAction::Set {
            name,
            property,
            value,
            category,
        } => {
            let mut entity = entity_in(model, &name, category.as_deref()).await?;
            let facets = model.entity_facets(&entity).await?;
            let target = facets
                .iter()
                .find_map(|f| f.property_by_name(&property))
                .cloned()
                .ok_or_else(|| {
                    anyhow!(
                        "No facet of entity '{}' declares a property named '{}'.",
                        name,
                        property
                    )
                })?;
            entity.set_facet_property(&target, Some(value.as_str()))?;
            model.entities().upsert(&entity).await?;
            output.note(format!("Set {}.{} = {}", name, property, value));
        }
    }
    Ok(())
}

async fn cmd_relationships(
    model: &Model,
    action: RelationshipAction,
    output: Output,
) -> anyhow::Result<()> {
    match action {
        RelationshipAction::List => {
            let relationships: Vec<Relationship> =
                model.relationships().find_all().try_collect().await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&relationships)?);
            }
            if relationships.is_empty() {
                output.note("No relationships found.");
            }
            for relationship in relationships {
                println!("{}", describe_relationship(model, &relationship).await?);
            }
        }
        RelationshipAction::Add {
            name,
            from,
            to,
            tags,
        } => {
            let from = unique_entity(model, &from).await?;
            let to = unique_entity(model, &to).await?;
            let mut relationship = Relationship::new(&name, &from, &to);
            for tag in &tags {
                relationship.add_tag(tag_by_name(model, tag).await?);
            }
            let relationship = model.relationships().upsert(&relationship).await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&relationship)?);
            }
            output.note(format!(
                "Relationship '{}' created ({}).",
                name, relationship.id
            ));
        }
        RelationshipAction::Remove { id } => {
            let id: RelationshipId = id
                .parse()
                .with_context(|| format!("Invalid relationship id: {}", id))?;
            let relationship = model.relationships().find_by_id(id).await?;
            model.relationships().delete(&relationship).await?;
            output.note(format!("Relationship '{}' deleted.", relationship.name));
        }
    }
    Ok(())
}

async fn cmd_categories(
    model: &Model,
    action: CategoryAction,
    output: Output,
) -> anyhow::Result<()> {
    match action {
        CategoryAction::Tree => {
            let root = model.categories().root().await?;
            let mut lines = Vec::new();
            let mut stack = vec![(root, 0usize)];
            while let Some((category, depth)) = stack.pop() {
                let children = model.categories().sub_categories(category.id).await?;
                let entities = model.entities().find_by_category(Some(category.id)).await?;
                lines.push((depth, category, entities));
                for child in children.into_iter().rev() {
                    stack.push((child, depth + 1));
                }
            }

            if output.json() {
                let nodes: Vec<_> = lines
                    .iter()
                    .map(|(depth, c, entities)| {
                        json!({
                            "id": c.id.to_string(),
                            "name": c.name,
                            "depth": depth,
                            "entities": entities.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                return output.emit(&json!(nodes));
            }
            for (depth, category, entities) in lines {
                println!("{}{}/", "  ".repeat(depth), category.name);
                for entity in entities {
                    println!("{}- {}", "  ".repeat(depth + 1), entity.name);
                }
            }
        }
        CategoryAction::Add { path } => {
            let mut parent = model.categories().root().await?;
            let mut created = 0;
            for name in segments(&path) {
                parent = match model
                    .categories()
                    .find_by_category_and_name(parent.id, name)
                    .await?
                {
                    Some(existing) => existing,
                    None => {
                        let mut child = Category::new(name);
                        parent.add_sub_category(&mut child);
                        model.categories().upsert(&child).await?;
                        model.categories().upsert(&parent).await?;
                        created += 1;
                        child
                    }
                };
            }
            if created == 0 {
                output.note(format!("Category '{}' already exists.", path));
            } else {
                output.note(format!("Category '{}' created.", path));
            }
        }
        CategoryAction::Copy { src, dst } => {
            let source = category_at(model, &src).await?;
            let destination = category_at(model, &dst).await?;
            let copy = model
                .copy_traverser()
                .copy_category(&source, &destination)
                .await?;
            if output.json() {
                return output.emit(&serde_json::to_value(&copy)?);
            }
            output.note(format!("Copied '{}' into '{}'.", src, dst));
        }
        CategoryAction::Remove { path, recursive } => {
            let category = category_at(model, &path).await?;
            let removal = model.removal_traverser();
            let deleted = if recursive {
                removal.delete_recursively(&category).await?
            } else {
                removal.delete_if_empty(&category).await?
            };
            if !deleted {
                return Err(anyhow!(
                    "Category '{}' was not deleted. The root is permanent and a non-empty category needs --recursive.",
                    path
                ));
            }
            output.note(format!("Category '{}' deleted.", path));
        }
    }
    Ok(())
}

async fn cmd_query(model: &Model, tags: &[String], output: Output) -> anyhow::Result<()> {
    let mut query = model.multi_tag_query(QueryCallbacks::new());
    for name in tags {
        query.add(tag_by_name(model, name).await?).await?;
    }

    let mut entities = query.entities();
    let mut relationships = query.relationships();
    entities.sort_by(|a, b| a.name.cmp(&b.name));
    relationships.sort_by(|a, b| a.name.cmp(&b.name));
    query.clear();

    if output.json() {
        return output.emit(&json!({
            "entities": entities,
            "relationships": relationships,
        }));
    }
    if entities.is_empty() && relationships.is_empty() {
        output.note("Nothing carries those tags.");
        return Ok(());
    }
    if !entities.is_empty() {
        output.note("Entities:");
        for entity in &entities {
            println!("  {}", describe_entity(model, entity).await?);
        }
    }
    if !relationships.is_empty() {
        output.note("Relationships:");
        for relationship in &relationships {
            println!("  {}", describe_relationship(model, relationship).await?);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, output: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            output.note(format!("Set {} = {}", key, value));
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if output.json() {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                return output.emit(&serde_json::Value::Object(map));
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            output.note("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Non-empty segments of a `/`-separated category path
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve a category path from the root; `/` or an empty path is the root
async fn category_at(model: &Model, path: &str) -> anyhow::Result<Category> {
    let mut category = model.categories().root().await?;
    for name in segments(path) {
        category = model
            .categories()
            .find_by_category_and_name(category.id, name)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Category '{}' not found. Run `facetgraph categories tree` to see the tree.",
                    path
                )
            })?;
    }
    Ok(category)
}

async fn tag_by_name(model: &Model, name: &str) -> anyhow::Result<Tag> {
    model.tags().find_by_name(name).await?.ok_or_else(|| {
        anyhow!(
            "Tag '{}' not found. Run `facetgraph tags list` to see all tags.",
            name
        )
    })
}

async fn entity_in(model: &Model, name: &str, category: Option<&str>) -> anyhow::Result<Entity> {
    let scope = match category {
        Some(path) => Some(category_at(model, path).await?.id),
        None => None,
    };
    model
        .entities()
        .find_by_category_and_name(scope, name)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "Entity '{}' not found{}.",
                name,
                category.map(|c| format!(" in '{}'", c)).unwrap_or_default()
            )
        })
}

/// An entity picked by name alone; fails when the name is ambiguous
async fn unique_entity(model: &Model, name: &str) -> anyhow::Result<Entity> {
    let mut matches = model.entities().find_by_name(name).await?;
    match matches.len() {
        0 => Err(anyhow!("Entity '{}' not found.", name)),
        1 => Ok(matches.remove(0)),
        n => Err(anyhow!(
            "Entity name '{}' is ambiguous ({} matches in different categories).",
            name,
            n
        )),
    }
}

async fn describe_entity(model: &Model, entity: &Entity) -> anyhow::Result<String> {
    let mut line = entity.name.clone();
    if let Some(id) = entity.category {
        line.push_str(&format!(" in {}", category_path(model, id).await?));
    }
    if !entity.tags.is_empty() {
        let tags: Vec<&str> = entity.tags.iter().map(|t| t.name.as_str()).collect();
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    for facet in model.entity_facets(entity).await? {
        for property in facet.properties() {
            if let Some(value) = entity.facet_value(property.id) {
                line.push_str(&format!(" {}={}", property.name, value));
            }
        }
    }
    Ok(line)
}

async fn describe_relationship(
    model: &Model,
    relationship: &Relationship,
) -> anyhow::Result<String> {
    let from = model.entities().find_by_id(relationship.from).await?;
    let to = model.entities().find_by_id(relationship.to).await?;
    let mut line = format!(
        "{} {} -> {} ({})",
        relationship.name, from.name, to.name, relationship.id
    );
    if !relationship.tags.is_empty() {
        let tags: Vec<&str> = relationship.tags.iter().map(|t| t.name.as_str()).collect();
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    Ok(line)
}

/// `/`-joined names from just below the root down to the category
async fn category_path(model: &Model, id: CategoryId) -> anyhow::Result<String> {
    let category = model.categories().find_by_id(id).await?;
    let chain = model.categories().ancestry(&category).await?;
    let names: Vec<&str> = chain
        .iter()
        .rev()
        .filter(|c| !c.is_root())
        .map(|c| c.name())
        .collect();
    Ok(format!("/{}", names.join("/")))
}
