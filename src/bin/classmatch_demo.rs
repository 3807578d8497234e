//! Demo harness: builds a small synthetic "before/after obfuscation" image
//! pair in memory and runs the matcher against it, standing in for the
//! external assembler that normally produces [`classmatch::Image`]s.

use anyhow::Context;
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use classmatch::{
    AccessFlags, ImageBuilder, Image, Level, MatchStore, MatcherConfig, MatcherDriver, ProgressReporter,
};

#[derive(Parser)]
#[command(name = "classmatch-demo", version, about = "Runs the matcher against a built-in synthetic image pair")]
struct Cli {
    /// Enable debug-level logging.
    #[arg(long)]
    verbose: bool,

    /// Disable hierarchy propagation.
    #[arg(long)]
    no_propagate: bool,
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(Level::ALL.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        BarProgress { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn on_level_start(&self, level: Level) {
        self.bar.set_message(format!("matching {level}"));
    }

    fn on_level_end(&self, level: Level, classes: usize, methods: usize, fields: usize) {
        log::info!("{level}: {classes} classes, {methods} methods, {fields} fields matched so far");
        self.bar.inc(1);
        if level == Level::Final {
            self.bar.finish_with_message("done");
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level_filter).init();

    let (image_a, image_b) = build_sample_pair();
    log::info!(
        "built sample images: A has {} classes, B has {} classes",
        image_a.classes.len(),
        image_b.classes.len()
    );

    let mut config = MatcherConfig::default();
    if cli.no_propagate {
        config.propagate_hierarchy = false;
    }

    let store = MatcherDriver::new(&image_a, &image_b, config)
        .with_progress(Box::new(BarProgress::new()))
        .run()
        .context("matcher run failed")?;

    print_summary(&image_a, &image_b, &store);
    Ok(())
}

/// A small class hierarchy (one abstract base, one concrete subclass, with a
/// call from the subclass into an inherited method) present twice: once
/// with descriptive names (`image_a`) and once with obfuscated single-letter
/// names (`image_b`), standing in for a renamed/obfuscated build of the same
/// program.
fn build_sample_pair() -> (Image, Image) {
    let mut a = ImageBuilder::new();
    let void_a = a.add_class("void", AccessFlags::empty(), false);
    let string_a = a.add_class("String", AccessFlags::empty(), false);
    let base_a = a.add_class("Animal", AccessFlags::ABSTRACT, true);
    let dog_a = a.add_class("Dog", AccessFlags::empty(), true);
    a.set_parent(dog_a, base_a);
    let name_field_a = a.add_field(base_a, "name", string_a, AccessFlags::PRIVATE, true);
    let speak_a = a.add_method(base_a, "speak", vec![], void_a, AccessFlags::PUBLIC, 4, true);
    let bark_a = a.add_method(dog_a, "bark", vec![], void_a, AccessFlags::PUBLIC, 6, true);
    a.add_call(bark_a, speak_a);
    a.add_field_read(speak_a, name_field_a);
    let image_a = a.build().expect("sample image A violates an invariant");

    let mut b = ImageBuilder::new();
    let void_b = b.add_class("a", AccessFlags::empty(), false);
    let string_b = b.add_class("b", AccessFlags::empty(), false);
    let base_b = b.add_class("c", AccessFlags::ABSTRACT, true);
    let dog_b = b.add_class("d", AccessFlags::empty(), true);
    b.set_parent(dog_b, base_b);
    let name_field_b = b.add_field(base_b, "e", string_b, AccessFlags::PRIVATE, true);
    let speak_b = b.add_method(base_b, "f", vec![], void_b, AccessFlags::PUBLIC, 4, true);
    let bark_b = b.add_method(dog_b, "g", vec![], void_b, AccessFlags::PUBLIC, 6, true);
    b.add_call(bark_b, speak_b);
    b.add_field_read(speak_b, name_field_b);
    let image_b = b.build().expect("sample image B violates an invariant");

    (image_a, image_b)
}

fn print_summary(image_a: &Image, image_b: &Image, store: &MatchStore) {
    println!("\n{}", style("class matches").bold().underlined());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["A", "B", "score", "ambiguous"]);
    for record in store.class_matches() {
        table.add_row(vec![
            Cell::new(&image_a.class(record.a).name),
            Cell::new(&image_b.class(record.b).name),
            Cell::new(format!("{:.2}", record.score)),
            Cell::new(if store.is_class_ambiguous(record.a) { "yes" } else { "" }),
        ]);
    }
    println!("{table}");

    println!("\n{}", style("method matches").bold().underlined());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["A", "B", "score"]);
    for record in store.method_matches() {
        table.add_row(vec![
            Cell::new(&image_a.method(record.a).name),
            Cell::new(&image_b.method(record.b).name),
            Cell::new(format!("{:.2}", record.score)),
        ]);
    }
    println!("{table}");

    println!(
        "\n{} classes, {} methods, {} fields matched",
        store.class_match_count(),
        store.method_match_count(),
        store.field_match_count()
    );
}
