//! `ontology-store` command line: load the ontology once and answer a single query.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::{
    config::Config,
    logger,
    ontology::{InMemoryOntologyStore, Iri, OntologyStore},
    Result,
};

#[derive(Parser, Debug)]
#[command(name = "ontology-store", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config/ontology.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the ontology and print what was indexed
    Load,
    /// Print a class with everything it inherits up to an ancestor
    Class {
        class: String,
        #[arg(long)]
        ancestor: Option<String>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Print the classes between a class and one of its ancestors
    Ancestors { class: String, ancestor: String },
    /// Print the properties that can still be linked to a class
    Linkable {
        domain: String,
        #[arg(long)]
        ancestor: Option<String>,
        #[arg(long)]
        lang: Option<String>,
        /// List object properties instead of data properties
        #[arg(long)]
        object: bool,
    },
}

/// Parses the command line, loads the configured ontology and prints the answer.
///
/// # Errors
/// When configuration, loading or the query fails.
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    logger::init(&config.logger)?;

    let store = InMemoryOntologyStore::from_config(&config)?;
    store.load().await?;
    println!("{}", run(&store, &cli.command).await?);
    Ok(())
}

/// Answers `command` against an already loaded `store`.
pub async fn run(store: &InMemoryOntologyStore, command: &Commands) -> Result<String> {
    let output = match command {
        Commands::Load => {
            let stats = store.stats();
            format!(
                "{} {} classes, {} data properties, {} object properties, {} restrictions",
                "loaded".green(),
                stats.classes,
                stats.datatype_properties,
                stats.object_properties,
                stats.restrictions
            )
        }
        Commands::Class {
            class,
            ancestor,
            lang,
        } => {
            let ancestor = ancestor.as_deref().map(Iri::new).transpose()?;
            let model = store
                .get_class_model(&Iri::new(class.as_str())?, ancestor.as_ref(), lang.as_deref())
                .await?;
            serde_json::to_string_pretty(&model)?
        }
        Commands::Ancestors { class, ancestor } => {
            let ancestors = store
                .get_ancestor_hierarchy(&Iri::new(class.as_str())?, &Iri::new(ancestor.as_str())?);
            serde_json::to_string_pretty(&ancestors)?
        }
        Commands::Linkable {
            domain,
            ancestor,
            lang,
            object,
        } => {
            let domain = Iri::new(domain.as_str())?;
            let ancestor = ancestor.as_deref().map(Iri::new).transpose()?;
            if *object {
                let properties = store
                    .get_linkable_object_properties(&domain, ancestor.as_ref(), lang.as_deref())
                    .await?;
                serde_json::to_string_pretty(&properties)?
            } else {
                let properties = store
                    .get_linkable_data_properties(&domain, ancestor.as_ref(), lang.as_deref())
                    .await?;
                serde_json::to_string_pretty(&properties)?
            }
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{run, Cli, Commands};
    use crate::ontology::OntologyStore;
    use crate::tests_cfg::{example_ontology, store, EXAMPLE_NAMESPACE};

    #[test]
    fn parses_linkable_flags() {
        let cli = Cli::try_parse_from([
            "ontology-store",
            "linkable",
            "vocabulary:Plant",
            "--object",
            "--lang",
            "fr",
        ])
        .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Commands::Linkable { object: true, ref lang, .. } if lang.as_deref() == Some("fr")
        ));
    }

    #[tokio::test]
    async fn ancestors_are_printed_as_json() {
        let store = store(&example_ontology());
        store.load().await.expect("load");
        let output = run(
            &store,
            &Commands::Ancestors {
                class: format!("{EXAMPLE_NAMESPACE}C"),
                ancestor: format!("{EXAMPLE_NAMESPACE}A"),
            },
        )
        .await
        .expect("ancestors");
        let ancestors: Vec<String> = serde_json::from_str(&output).expect("json array");
        assert_eq!(
            ancestors,
            vec![format!("{EXAMPLE_NAMESPACE}A"), format!("{EXAMPLE_NAMESPACE}B")]
        );
    }

    #[tokio::test]
    async fn class_output_carries_inherited_properties() {
        let store = store(&example_ontology());
        store.load().await.expect("load");
        let output = run(
            &store,
            &Commands::Class {
                class: format!("{EXAMPLE_NAMESPACE}C"),
                ancestor: Some(format!("{EXAMPLE_NAMESPACE}A")),
                lang: Some("en".to_string()),
            },
        )
        .await
        .expect("class");
        let model: serde_json::Value = serde_json::from_str(&output).expect("json object");
        assert!(model["datatype_properties"]
            .get(format!("{EXAMPLE_NAMESPACE}name"))
            .is_some());
    }
}
