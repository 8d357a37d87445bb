//! Build actions derived from the final variant graph
//!
//! Actions are descriptions only: a rule name, inputs, outputs and the flags
//! the rule would be invoked with. Nothing here runs a compiler.

use crate::batch::split_for_size;
use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::graph::{Variant, VariantGraph, VariantId, LINK_AXIS};
use crate::module::ModuleKind;
use crate::passes::link::SHARED_VARIATION;
use crate::tag::DependencyTag;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RULE_CC: &str = "cc";
pub const RULE_AR: &str = "ar";
pub const RULE_AR_APPEND: &str = "ar_append";
pub const RULE_LD: &str = "ld";

/// One build step of one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildAction {
    pub rule: String,
    pub description: String,
    pub module: String,
    /// Variation subdirectory of the variant the action belongs to
    pub variant: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub args: Vec<String>,
}

/// Every action of a build, in graph order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActionSet {
    actions: Vec<BuildAction>,
}

impl ActionSet {
    pub fn iter(&self) -> impl Iterator<Item = &BuildAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions of one variant
    pub fn for_variant(&self, module: &str, variant: &str) -> ActionSet {
        self.actions
            .iter()
            .filter(|a| a.module == module && a.variant == variant)
            .cloned()
            .collect()
    }

    /// First action whose rule name contains `rule`
    pub fn find_by_rule(&self, rule: &str) -> BuildResult<&BuildAction> {
        self.actions
            .iter()
            .find(|a| a.rule.contains(rule))
            .ok_or_else(|| self.not_found(format!("rule '{}'", rule), |a| a.rule.clone()))
    }

    /// The action with exactly this description
    pub fn find_by_description(&self, description: &str) -> BuildResult<&BuildAction> {
        self.actions
            .iter()
            .find(|a| a.description == description)
            .ok_or_else(|| {
                self.not_found(format!("description '{}'", description), |a| {
                    a.description.clone()
                })
            })
    }

    /// The action producing `output`, matched on trailing path components
    pub fn find_by_output(&self, output: impl AsRef<Path>) -> BuildResult<&BuildAction> {
        let output = output.as_ref();
        self.actions
            .iter()
            .find(|a| a.outputs.iter().any(|o| o.ends_with(output)))
            .ok_or_else(|| {
                self.not_found(format!("output '{}'", output.display()), |a| {
                    a.outputs
                        .iter()
                        .map(|o| o.display().to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
            })
    }

    fn not_found(&self, wanted: String, show: impl Fn(&BuildAction) -> String) -> BuildError {
        let available: Vec<String> = self.actions.iter().map(show).collect();
        BuildError::ActionNotFound(format!("{}, available: [{}]", wanted, available.join(", ")))
    }
}

impl FromIterator<BuildAction> for ActionSet {
    fn from_iter<I: IntoIterator<Item = BuildAction>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ActionSet {
    type Item = BuildAction;
    type IntoIter = std::vec::IntoIter<BuildAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

/// How a variant is linked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Objects,
    StaticArchive,
    SharedLibrary,
    Executable,
}

impl OutputKind {
    pub fn of(variant: &Variant) -> Option<Self> {
        match variant.kind {
            ModuleKind::Defaults => None,
            ModuleKind::Object => Some(OutputKind::Objects),
            ModuleKind::Binary => Some(OutputKind::Executable),
            ModuleKind::StaticLibrary => Some(OutputKind::StaticArchive),
            ModuleKind::SharedLibrary => Some(OutputKind::SharedLibrary),
            ModuleKind::Library => match variant.variations.get(LINK_AXIS) {
                Some(SHARED_VARIATION) => Some(OutputKind::SharedLibrary),
                _ => Some(OutputKind::StaticArchive),
            },
        }
    }
}

/// Directory holding everything built for `variant`
pub fn variant_dir(config: &BuildConfig, variant: &Variant) -> PathBuf {
    let dir = config.out_dir.join(&variant.module);
    let subdir = variant.subdir();
    if subdir.is_empty() {
        dir
    } else {
        dir.join(subdir)
    }
}

/// Final output of `variant`; object modules have none
pub fn output_path(config: &BuildConfig, variant: &Variant) -> Option<PathBuf> {
    let ext = match OutputKind::of(variant)? {
        OutputKind::Objects => return None,
        OutputKind::StaticArchive => ".a",
        OutputKind::SharedLibrary => config.shlib_suffix.as_str(),
        OutputKind::Executable => "",
    };
    Some(variant_dir(config, variant).join(format!("{}{}", variant.module, ext)))
}

fn object_path(dir: &Path, src: &str) -> PathBuf {
    dir.join("obj").join(Path::new(src).with_extension("o"))
}

/// Object files `variant` compiles itself
pub fn object_paths(config: &BuildConfig, variant: &Variant) -> Vec<PathBuf> {
    let dir = variant_dir(config, variant);
    variant
        .props
        .srcs
        .iter()
        .map(|src| object_path(&dir, src))
        .collect()
}

/// Generate the actions of every live variant
pub fn generate_actions(graph: &VariantGraph, config: &BuildConfig) -> BuildResult<ActionSet> {
    let variants: Vec<&Variant> = graph
        .live_variants()
        .filter(|v| v.kind.is_buildable())
        .collect();

    let generator = Generator { graph, config };
    let per_variant: Vec<Vec<BuildAction>> = if config.parallel {
        variants
            .par_iter()
            .map(|v| generator.variant_actions(v))
            .collect::<BuildResult<_>>()?
    } else {
        variants
            .iter()
            .map(|v| generator.variant_actions(v))
            .collect::<BuildResult<_>>()?
    };

    let actions: ActionSet = per_variant.into_iter().flatten().collect();
    debug!(variants = variants.len(), actions = actions.len(), "generated actions");
    Ok(actions)
}

struct Generator<'a> {
    graph: &'a VariantGraph,
    config: &'a BuildConfig,
}

impl Generator<'_> {
    fn variant_actions(&self, variant: &Variant) -> BuildResult<Vec<BuildAction>> {
        let Some(kind) = OutputKind::of(variant) else {
            return Ok(Vec::new());
        };

        let reused = match kind {
            OutputKind::SharedLibrary => self.reusable_objects(variant)?,
            _ => None,
        };

        let mut actions = Vec::new();
        let objects = match reused {
            Some(objects) => objects,
            None => {
                actions.extend(self.compile(variant));
                object_paths(self.config, variant)
            }
        };

        match kind {
            OutputKind::Objects => {}
            OutputKind::StaticArchive => actions.extend(self.archive(variant, objects)?),
            OutputKind::SharedLibrary | OutputKind::Executable => {
                actions.push(self.link(variant, objects)?)
            }
        }
        Ok(actions)
    }

    fn action(&self, variant: &Variant, rule: &str, description: String) -> BuildAction {
        BuildAction {
            rule: rule.to_string(),
            description,
            module: variant.module.clone(),
            variant: variant.subdir(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            args: Vec::new(),
        }
    }

    fn compile(&self, variant: &Variant) -> Vec<BuildAction> {
        let dir = variant_dir(self.config, variant);
        variant
            .props
            .srcs
            .iter()
            .map(|src| {
                let mut action = self.action(variant, RULE_CC, format!("cc {}", src));
                action.inputs.push(PathBuf::from(src));
                action.outputs.push(object_path(&dir, src));
                action.args = variant.props.flags.cflags.clone();
                action
            })
            .collect()
    }

    /// Objects of the static sibling, when it compiles exactly what this variant would
    fn reusable_objects(&self, variant: &Variant) -> BuildResult<Option<Vec<PathBuf>>> {
        let reused = self
            .graph
            .direct_deps(variant.id(), &[DependencyTag::ReusedObject])?;
        let Some((_, sibling)) = reused.first() else {
            return Ok(None);
        };
        let sibling = self.variant(*sibling)?;
        if sibling.props.srcs != variant.props.srcs
            || sibling.props.flags.cflags != variant.props.flags.cflags
        {
            return Ok(None);
        }
        Ok(Some(object_paths(self.config, sibling)))
    }

    fn archive(&self, variant: &Variant, objects: Vec<PathBuf>) -> BuildResult<Vec<BuildAction>> {
        let Some(output) = output_path(self.config, variant) else {
            return Ok(Vec::new());
        };
        let batches = split_for_size(objects, self.config.max_command_size)?;
        let count = batches.len().max(1);
        let name = format!("{}.a", variant.module);

        let mut actions = Vec::with_capacity(count);
        let mut previous: Option<PathBuf> = None;
        let mut batches = batches.into_iter();
        for index in 0..count {
            let batch = batches.next().unwrap_or_default();
            let target = if index + 1 == count {
                output.clone()
            } else {
                intermediate(&output, index)
            };

            let mut action = match &previous {
                None => self.action(variant, RULE_AR, format!("ar {}", name)),
                Some(_) => self.action(variant, RULE_AR_APPEND, format!("ar_append {} ({})", name, index)),
            };
            action.inputs.extend(previous.take());
            action.inputs.extend(batch);
            action.outputs.push(target.clone());
            actions.push(action);
            previous = Some(target);
        }
        Ok(actions)
    }

    fn link(&self, variant: &Variant, objects: Vec<PathBuf>) -> BuildResult<BuildAction> {
        let output = output_path(self.config, variant)
            .ok_or_else(|| BuildError::resolution(format!("{} has no link output", variant.display_name())))?;

        let mut inputs = objects;
        for (_, id) in self.graph.direct_deps(variant.id(), &[DependencyTag::Object])? {
            inputs.extend(object_paths(self.config, self.variant(id)?));
        }
        inputs.extend(self.outputs_of(variant, DependencyTag::WholeStatic)?);
        let order = self.graph.static_link_order(variant.id())?;
        for id in order.declared {
            inputs.extend(output_path(self.config, self.variant(id)?));
        }
        inputs.extend(self.outputs_of(variant, DependencyTag::LateStatic)?);
        inputs.extend(self.outputs_of(variant, DependencyTag::SharedLib)?);

        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut action = self.action(variant, RULE_LD, format!("ld {}", file_name));
        action.inputs = inputs;
        action.outputs.push(output);
        action.args = variant.props.flags.ldflags.clone();
        Ok(action)
    }

    fn outputs_of(&self, variant: &Variant, tag: DependencyTag) -> BuildResult<Vec<PathBuf>> {
        let mut outputs = Vec::new();
        for (_, id) in self.graph.direct_deps(variant.id(), &[tag])? {
            outputs.extend(output_path(self.config, self.variant(id)?));
        }
        Ok(outputs)
    }

    fn variant(&self, id: VariantId) -> BuildResult<&Variant> {
        self.graph
            .variant(id)
            .ok_or_else(|| BuildError::resolution(format!("variant {} is not live", id)))
    }
}

/// `<output>.<index>`, the numbered archive a batch chain passes along
fn intermediate(output: &Path, index: usize) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleDecl;
    use pretty_assertions::assert_eq;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_archive_batches_chain() {
        let graph = VariantGraph::from_modules([
            ModuleDecl::new("libbig", ModuleKind::StaticLibrary).srcs(["a.c", "b.c", "c.c"])
        ])
        .unwrap();
        // each object path is "out/libbig/obj/x.o", 18 bytes
        let config = BuildConfig {
            max_command_size: 40,
            ..Default::default()
        };

        let actions = generate_actions(&graph, &config).unwrap();
        let archives: Vec<&BuildAction> = actions.iter().filter(|a| a.rule.starts_with("ar")).collect();
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[0].rule, RULE_AR);
        assert_eq!(names(&archives[0].inputs), vec!["a.o", "b.o"]);
        assert_eq!(names(&archives[0].outputs), vec!["libbig.a.0"]);
        assert_eq!(archives[1].rule, RULE_AR_APPEND);
        assert_eq!(names(&archives[1].inputs), vec!["libbig.a.0", "c.o"]);
        assert_eq!(names(&archives[1].outputs), vec!["libbig.a"]);
    }

    #[test]
    fn test_object_too_large_for_command() {
        let graph = VariantGraph::from_modules([
            ModuleDecl::new("libbig", ModuleKind::StaticLibrary).srcs(["a.c"])
        ])
        .unwrap();
        let config = BuildConfig {
            max_command_size: 4,
            ..Default::default()
        };
        let err = generate_actions(&graph, &config).unwrap_err();
        assert!(matches!(err, BuildError::ItemTooLarge { .. }));
    }

    #[test]
    fn test_find_helpers() {
        let graph = VariantGraph::from_modules([
            ModuleDecl::binary("bin").srcs(["main.c"]).static_libs(["liba"]),
            ModuleDecl::new("liba", ModuleKind::StaticLibrary).srcs(["a.c"]),
        ])
        .unwrap();
        let actions = generate_actions(&graph, &BuildConfig::default()).unwrap();

        let ld = actions.find_by_rule("ld").unwrap();
        assert_eq!(ld.module, "bin");
        assert_eq!(names(&ld.inputs), vec!["main.o", "liba.a"]);
        assert!(actions.find_by_description("cc a.c").is_ok());
        assert_eq!(actions.find_by_output("liba/liba.a").unwrap().rule, RULE_AR);

        let err = actions.find_by_rule("javac").unwrap_err();
        assert!(err.to_string().contains("available"));
    }

    #[test]
    fn test_empty_archive_still_produced() {
        let graph =
            VariantGraph::from_modules([ModuleDecl::new("libempty", ModuleKind::StaticLibrary)]).unwrap();
        let actions = generate_actions(&graph, &BuildConfig::default()).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions.find_by_output("libempty.a").is_ok());
    }
}
