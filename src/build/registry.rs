//! Standard task registry.
//!
//! Builds the named content tasks from a [`BuildContext`] and maps changed
//! paths back to the tasks that watch them.

use crate::build::context::BuildContext;
use crate::build::discovery::{DiscoveryError, PatternSet};
use crate::build::pipeline::{Job, Pipeline};
use crate::build::task::{ReloadKind, Task};
use crate::server::reload::ReloadHub;
use crate::transforms::images::{JPEG_EXTENSIONS, PNG_EXTENSIONS};
use crate::transforms::{
    Chain, ChainMap, Codec, Convert, CssImport, CssProcess, HtmlMinify, Include, Recompress, Suffix,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const HTML: &str = "html";
pub const STYLES: &str = "styles";
pub const SCRIPTS: &str = "scripts";
pub const IMAGES: &str = "images";
pub const FONTS: &str = "fonts";
pub const MEDIA: &str = "media";
pub const SCRIPTS_LIBS: &str = "scriptsLibs";
pub const STYLES_LIBS: &str = "stylesLibs";

/// Ordered set of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<Task>>,
}

impl TaskRegistry {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks: tasks.into_iter().map(Arc::new).collect() }
    }

    /// The standard tasks for the context's profile.
    pub fn standard(ctx: &BuildContext, hub: &ReloadHub) -> Result<Self, DiscoveryError> {
        let libs = &ctx.config().libs;
        let tasks = vec![
            html_task(ctx, hub)?,
            styles_task(ctx, hub)?,
            scripts_task(ctx, hub)?,
            images_task(ctx, hub)?,
            copy_task(ctx, hub, FONTS)?,
            copy_task(ctx, hub, MEDIA)?,
            libs_task(ctx, hub, SCRIPTS_LIBS, "scripts", "js", &libs.scripts_bundle)?,
            libs_task(ctx, hub, STYLES_LIBS, "styles", "css", &libs.styles_bundle)?,
        ];
        Ok(Self::new(tasks))
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    /// Task names in registry order.
    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// Tasks whose watch set selects `path`.
    pub fn tasks_for_path(&self, path: &Path) -> Vec<Arc<Task>> {
        self.tasks.iter().filter(|t| t.watches(path)).cloned().collect()
    }

    /// Tasks selected by any of `paths`, deduplicated, in registry order.
    pub fn tasks_for_paths(&self, paths: &[PathBuf]) -> Vec<Arc<Task>> {
        self.tasks.iter().filter(|t| paths.iter().any(|p| t.watches(p))).cloned().collect()
    }

    /// Every task as one parallel node.
    pub fn content_pipeline(&self) -> Pipeline {
        Pipeline::parallel(
            self.tasks.iter().map(|t| Pipeline::job(Arc::clone(t) as Arc<dyn Job>)).collect(),
        )
    }
}

fn pattern_set(ctx: &BuildContext, rels: &[String]) -> Result<PatternSet, DiscoveryError> {
    let patterns: Vec<String> = rels
        .iter()
        .map(|rel| match rel.strip_prefix('!') {
            Some(body) => format!("!{}", ctx.src_pattern(body)),
            None => ctx.src_pattern(rel),
        })
        .collect();
    PatternSet::new(ctx.project_root(), &patterns)
}

fn patterns(rels: &[&str]) -> Vec<String> {
    rels.iter().map(|s| s.to_string()).collect()
}

fn base_task(
    ctx: &BuildContext,
    hub: &ReloadHub,
    name: &str,
    inputs: &[String],
    out_subdir: &str,
) -> Result<Task, DiscoveryError> {
    Ok(Task::new(name, pattern_set(ctx, inputs)?, ctx.output_root(), out_subdir, hub.clone())?
        .with_jobs(ctx.jobs()))
}

fn suffixed(chain: Chain, ctx: &BuildContext) -> Chain {
    match ctx.suffix() {
        Some(suffix) => chain.then(Suffix(suffix.to_string())),
        None => chain,
    }
}

/// Pages: includes resolved, then minified.
fn html_task(ctx: &BuildContext, hub: &ReloadHub) -> Result<Task, DiscoveryError> {
    let chain = Chain::new().then(Include).then_if(ctx.minify(), HtmlMinify);
    Ok(base_task(ctx, hub, HTML, &patterns(&["*.html"]), "")?
        .with_chains(ChainMap::uniform(chain))
        .with_watch(pattern_set(ctx, &patterns(&["**/*.html"]))?))
}

fn styles_task(ctx: &BuildContext, hub: &ReloadHub) -> Result<Task, DiscoveryError> {
    let inputs = patterns(&["styles/**/*.css", "!styles/**/_*.css", "!styles/libs/**/*"]);
    let chain = suffixed(
        Chain::new().then(CssImport).then(CssProcess::new(ctx.browsers(), ctx.minify())),
        ctx,
    );
    Ok(base_task(ctx, hub, STYLES, &inputs, "styles")?
        .with_chains(ChainMap::uniform(chain))
        .with_watch(pattern_set(ctx, &patterns(&["styles/**/*.css"]))?)
        .with_reload(ReloadKind::Css))
}

fn scripts_task(ctx: &BuildContext, hub: &ReloadHub) -> Result<Task, DiscoveryError> {
    let inputs = patterns(&["scripts/**/*.js", "!scripts/**/_*.js", "!scripts/libs/**/*"]);
    let mut chain = Chain::new().then(Include);
    if let Some(tool) = ctx.script_tool() {
        chain = chain.then(tool);
    }
    Ok(base_task(ctx, hub, SCRIPTS, &inputs, "scripts")?
        .with_chains(ChainMap::uniform(suffixed(chain, ctx)))
        .with_watch(pattern_set(ctx, &patterns(&["scripts/**/*.js"]))?))
}

/// One chain re-encoding in place plus one per extra format.
fn image_chains(ctx: &BuildContext, codec: Codec) -> Vec<Chain> {
    let mut chains = vec![Chain::new().then(Recompress(codec))];
    for format in ctx.image_formats() {
        chains.push(Chain::new().then(Convert::new(*format, ctx.avif_quality())));
    }
    chains
}

fn images_task(ctx: &BuildContext, hub: &ReloadHub) -> Result<Task, DiscoveryError> {
    let chains = ChainMap::default()
        .with_extensions(PNG_EXTENSIONS, image_chains(ctx, Codec::Png))
        .with_extensions(
            JPEG_EXTENSIONS,
            image_chains(ctx, Codec::Jpeg { quality: ctx.jpeg_quality() }),
        );
    Ok(base_task(ctx, hub, IMAGES, &patterns(&["images/**/*"]), "images")?.with_chains(chains))
}

fn copy_task(ctx: &BuildContext, hub: &ReloadHub, dir: &str) -> Result<Task, DiscoveryError> {
    base_task(ctx, hub, dir, &[format!("{}/**/*", dir)], dir)
}

/// Vendor libs copied untouched, or concatenated when bundling applies.
fn libs_task(
    ctx: &BuildContext,
    hub: &ReloadHub,
    name: &str,
    dir: &str,
    ext: &str,
    bundle: &Option<String>,
) -> Result<Task, DiscoveryError> {
    let inputs = [format!("{}/libs/**/*.{}", dir, ext)];
    let bundle = if ctx.bundle_libs() { bundle.clone() } else { None };
    let reload = if name == STYLES_LIBS { ReloadKind::Css } else { ReloadKind::Page };
    Ok(base_task(ctx, hub, name, &inputs, &format!("{}/libs", dir))?
        .with_bundle(bundle)
        .with_reload(reload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, Profile, SiteConfig};

    fn registry(config: SiteConfig) -> TaskRegistry {
        let ctx = BuildContext::new(config, PathBuf::from("/project")).unwrap();
        TaskRegistry::standard(&ctx, &ReloadHub::new()).unwrap()
    }

    fn names(tasks: &[Arc<Task>]) -> Vec<&str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_dist_profile_tasks() {
        let registry = registry(default_config());
        assert_eq!(
            registry.names(),
            vec!["html", "styles", "scripts", "images", "fonts", "media", "scriptsLibs", "stylesLibs"]
        );
    }

    #[test]
    fn test_libs_excluded_from_minify_tasks_in_every_profile() {
        for profile in [Profile::Dist, Profile::Assets] {
            let mut config = default_config();
            config.project.profile = profile;
            let registry = registry(config);

            let vendor_css = Path::new("/project/src/styles/libs/normalize.css");
            let vendor_js = Path::new("/project/src/scripts/libs/jquery.js");
            assert!(!registry.get(STYLES).unwrap().inputs().selects(vendor_css), "{}", profile);
            assert!(!registry.get(SCRIPTS).unwrap().inputs().selects(vendor_js), "{}", profile);
            assert!(registry.get(STYLES_LIBS).unwrap().inputs().selects(vendor_css), "{}", profile);
            assert!(registry.get(SCRIPTS_LIBS).unwrap().inputs().selects(vendor_js), "{}", profile);
        }
    }

    #[test]
    fn test_bundles_apply_only_when_profile_bundles_libs() {
        let mut config = default_config();
        config.libs.scripts_bundle = Some("libs.js".to_string());
        assert_eq!(registry(config.clone()).get(SCRIPTS_LIBS).unwrap().bundle(), None);

        config.project.profile = Profile::Assets;
        let registry = registry(config);
        let libs = registry.get(SCRIPTS_LIBS).unwrap();
        assert_eq!(libs.bundle(), Some("libs.js"));
        assert_eq!(libs.dest_dir(), PathBuf::from("/project/assets/scripts/libs"));
    }

    #[test]
    fn test_style_change_maps_to_styles_only() {
        let registry = registry(default_config());
        let tasks = registry.tasks_for_path(Path::new("/project/src/styles/_vars.css"));
        assert_eq!(names(&tasks), vec!["styles"]);
    }

    #[test]
    fn test_partial_html_triggers_html() {
        let registry = registry(default_config());
        let tasks = registry.tasks_for_path(Path::new("/project/src/templates/header.html"));
        assert_eq!(names(&tasks), vec!["html"]);
    }

    #[test]
    fn test_tasks_for_paths_dedupes_in_registry_order() {
        let registry = registry(default_config());
        let tasks = registry.tasks_for_paths(&[
            PathBuf::from("/project/src/images/a.png"),
            PathBuf::from("/project/src/index.html"),
            PathBuf::from("/project/src/images/b.png"),
            PathBuf::from("/project/README.md"),
        ]);
        assert_eq!(names(&tasks), vec!["html", "images"]);
    }

    #[test]
    fn test_base_and_destinations() {
        let registry = registry(default_config());
        let html = registry.get(HTML).unwrap();
        assert_eq!(html.base(), Path::new("/project/src"));
        assert_eq!(html.dest_dir(), PathBuf::from("/project/dist/"));

        let images = registry.get(IMAGES).unwrap();
        assert_eq!(images.base(), Path::new("/project/src/images"));
        assert_eq!(images.dest_dir(), PathBuf::from("/project/dist/images"));
    }

    #[test]
    fn test_content_pipeline_lists_every_task() {
        let registry = registry(default_config());
        assert_eq!(registry.content_pipeline().job_names().len(), registry.tasks().len());
    }
}
