//! Inventory Reconciler CLI
//!
//! Checks migrated files against destination snapshots and produces the
//! helper files used before and after a migration.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::{Path, PathBuf};

use inventory_reconciler::index::build_from_listings;
use inventory_reconciler::listing::{create_output, open_input};
use inventory_reconciler::{
    reconcile, write_listing, write_recovery_commands, write_seed_listing, CompareMode,
    ReconcileConfig, ReconcileError, ReconcileReport, RecoveryOptions, Result, SourceSchema,
};

const ABOUT: &str = r#"
Inventory Reconciler - 移行ファイル照合ツール

使用例:
  inventory_reconciler ct -b D:/share -s project.csv -d dest.csv -o result.csv
      プロジェクト一覧と移行先一覧を照合
  inventory_reconciler cs -b /sites/pj -q "/Shared Documents" -s list.csv -d spo.csv -o result.csv
      ファイル一覧とクラウドのエクスポートを照合
  inventory_reconciler l -b D:/share -o list.csv         ファイル一覧を作成
  inventory_reconciler r -r result.csv -o upload.ps1     再アップロード用コマンドを作成
"#;

/// File migration inventory reconciler
#[derive(Parser)]
#[command(name = "inventory_reconciler")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// プロジェクト一覧と移行先のファイル一覧を照合
    #[command(name = "check-temp", visible_alias = "ct")]
    CheckTemp {
        #[arg(short = 'c', long, default_value = "0", help = "並列数、0は自動（CPU数の半分）")]
        num_concurrent: usize,

        #[arg(short = 'b', long, help = "プロジェクト一覧のパスに付ける基準ディレクトリ")]
        base_dir: String,

        #[arg(short = 's', long, help = "プロジェクト一覧ファイル")]
        source: PathBuf,

        #[arg(short = 'd', long, help = "移行先のファイル一覧")]
        dest: PathBuf,

        #[arg(short = 'a', long, help = "移行先の旧ファイル一覧")]
        dest_old: Option<PathBuf>,

        #[arg(short = 'o', long, help = "照合結果の出力ファイル")]
        output: PathBuf,

        #[arg(short = 'g', long, help = "この文字列を含むパスは照合しない")]
        ignore: Option<String>,

        #[arg(short = 'm', long, default_value = "size-eq", help = "照合方式: size-eq, size-ge, size-ge-mod-after")]
        mode: CompareMode,

        #[arg(long, help = "照合結果をJSONで出力")]
        json: bool,

        #[arg(long, help = "進捗をJSONで標準エラーに出力")]
        progress: bool,
    },

    /// ファイル一覧とクラウドのエクスポートを照合
    #[command(name = "check-spo", visible_alias = "cs")]
    CheckSpo {
        #[arg(short = 'c', long, default_value = "0", help = "並列数、0は自動（CPU数の半分）")]
        num_concurrent: usize,

        #[arg(short = 'b', long, help = "クラウドのパスに付ける基準ディレクトリ")]
        base_dir: String,

        #[arg(short = 'q', long, help = "クラウドのパスから取り除く文字列")]
        spo_dir: Option<String>,

        #[arg(short = 's', long, help = "移行元のファイル一覧")]
        source: PathBuf,

        #[arg(short = 'd', long, help = "クラウドのエクスポートファイル")]
        dest: PathBuf,

        #[arg(short = 'o', long, help = "照合結果の出力ファイル")]
        output: PathBuf,

        #[arg(short = 'g', long, help = "この文字列を含むパスは照合しない")]
        ignore: Option<String>,

        #[arg(short = 'm', long, default_value = "size-ge-mod-after", help = "照合方式: size-eq, size-ge, size-ge-mod-after")]
        mode: CompareMode,

        #[arg(long, help = "照合結果をJSONで出力")]
        json: bool,

        #[arg(long, help = "進捗をJSONで標準エラーに出力")]
        progress: bool,
    },

    /// ディレクトリ配下のファイル一覧を作成
    #[command(name = "list", visible_alias = "l")]
    List {
        #[arg(short = 'b', long, help = "一覧を作成するディレクトリ")]
        base_dir: PathBuf,

        #[arg(short = 'o', long, help = "出力ファイル")]
        output: PathBuf,

        #[arg(short = 'V', long, default_value = "0", help = "指定件数ごとに進捗をログ出力、0は無効")]
        verbose: u64,
    },

    /// 照合結果から再アップロード用コマンドを作成
    #[command(name = "recovery-spo", visible_alias = "r")]
    RecoverySpo {
        #[arg(short = 'r', long, help = "照合結果ファイル")]
        recovery: PathBuf,

        #[arg(short = 'o', long, help = "出力ファイル")]
        output: PathBuf,

        #[arg(short = 't', long, help = "フォルダの先頭から取り除く文字列")]
        trim: Option<String>,

        #[arg(short = 'p', long, help = "フォルダの先頭に付けるアップロード先")]
        spopath: Option<String>,
    },

    /// プロジェクト一覧から移行先形式のダミー一覧を作成
    #[command(name = "dummy-temp-list", visible_alias = "d")]
    DummyTempList {
        #[arg(short = 's', long, help = "プロジェクト一覧ファイル")]
        source: PathBuf,

        #[arg(short = 'o', long, help = "出力ファイル")]
        output: PathBuf,

        #[arg(short = 'd', long, help = "日時の参照に使う移行先のファイル一覧")]
        dest: Option<PathBuf>,

        #[arg(short = 'a', long, help = "日時の参照に使う旧ファイル一覧")]
        dest_old: Option<PathBuf>,

        #[arg(short = 'b', long, help = "プロジェクト一覧のパスに付ける基準ディレクトリ")]
        base_dir: String,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("{}", ABOUT);
        println!("'inventory_reconciler --help' で全てのコマンドを表示します");
        return;
    };

    if let Err(e) = run(command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::CheckTemp {
            num_concurrent,
            base_dir,
            source,
            dest,
            dest_old,
            output,
            ignore,
            mode,
            json,
            progress,
        } => {
            let config = ReconcileConfig::builder()
                .base_dir(base_dir)
                .listing_destination(dest, dest_old)
                .source(source, SourceSchema::Project)
                .output_path(output)
                .ignore(ignore)
                .num_workers(num_concurrent)
                .mode(mode)
                .show_progress(progress)
                .build();
            run_check(&config, json)
        }
        Commands::CheckSpo {
            num_concurrent,
            base_dir,
            spo_dir,
            source,
            dest,
            output,
            ignore,
            mode,
            json,
            progress,
        } => {
            let config = ReconcileConfig::builder()
                .base_dir(base_dir.clone())
                .cloud_destination(dest, base_dir, spo_dir)
                .source(source, SourceSchema::Listing)
                .output_path(output)
                .ignore(ignore)
                .num_workers(num_concurrent)
                .mode(mode)
                .show_progress(progress)
                .build();
            run_check(&config, json)
        }
        Commands::List {
            base_dir,
            output,
            verbose,
        } => {
            info!("Listing {}", base_dir.display());
            let written = write_listing(&base_dir, create_output(&output)?, verbose)?;
            println!("{} 件を {} に出力しました", written, output.display());
            Ok(())
        }
        Commands::RecoverySpo {
            recovery,
            output,
            trim,
            spopath,
        } => {
            let options = RecoveryOptions::new(trim, spopath);
            let counts =
                write_recovery_commands(open_input(&recovery)?, create_output(&output)?, &options)?;
            println!(
                "{} 行を読み込み、{} 件のコマンドを {} に出力しました",
                counts.read,
                counts.written,
                output.display()
            );
            Ok(())
        }
        Commands::DummyTempList {
            source,
            output,
            dest,
            dest_old,
            base_dir,
        } => {
            let index = match dest {
                Some(dest) => {
                    let old = dest_old.as_deref().map(open_input).transpose()?;
                    Some(build_from_listings(open_input(&dest)?, old)?.0)
                }
                None => None,
            };
            let counts = write_seed_listing(
                open_input(&source)?,
                &base_dir,
                index.as_ref(),
                create_output(&output)?,
            )?;
            println!(
                "{} 行を読み込み、{} 件を {} に出力しました",
                counts.read,
                counts.written,
                output.display()
            );
            Ok(())
        }
    }
}

fn run_check(config: &ReconcileConfig, json: bool) -> Result<()> {
    let report = reconcile(config)?;
    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| ReconcileError::io(format!("failed to encode report: {}", e)))?;
        println!("{}", text);
    } else {
        print_summary(&report, &config.output_path);
    }
    Ok(())
}

fn print_summary(report: &ReconcileReport, output: &Path) {
    println!("照合完了:");
    println!("  移行先エントリ: {}", report.index.added);
    println!("  照合件数: {}", report.compared);
    println!("  除外件数: {}", report.source.skipped());
    println!("  並列数: {}", report.workers);
    println!("  不一致: {}", report.written);
    println!("    ファイルなし: {}", report.tally.non_existent);
    println!("    ファイルサイズ不一致: {}", report.tally.size_mismatch);
    println!("    ファイルサイズ縮小: {}", report.tally.size_shrink);
    println!("    ファイル更新日時エラー: {}", report.tally.modified_time_invalid);
    println!("  出力: {}", output.display());
    println!("  所要時間: {}ms", report.duration_ms);
}
