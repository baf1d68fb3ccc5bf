//! CLI 모듈
//!
//! grounded-rag CLI 명령어 정의 및 구현 (파이프라인의 얇은 클라이언트)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::RagConfig;
use crate::error::RagError;
use crate::knowledge::{Answer, IndexStore};
use crate::pipeline::{Pipeline, PipelineStatus};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "grounded-rag")]
#[command(version, about = "로컬 문서 기반 질의응답 (RAG)", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령에 공통인 설정 덮어쓰기
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// JSON 설정 파일
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 문서 디렉토리
    #[arg(short, long, global = true)]
    pub docs: Option<PathBuf>,

    /// 임베딩 모델 ID (local-hash-384, gemini-embedding-001, ollama:<model>)
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// 생성 모델 ID (llama-3.1-8b-instant, gemini-2.0-flash 등)
    #[arg(long, global = true)]
    pub generation_model: Option<String>,

    /// 인덱스 DB 경로
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// 인덱스를 디스크에 저장하지 않음
    #[arg(long, global = true)]
    pub no_store: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 디렉토리 인덱싱
    Index {
        /// 영속 인덱스가 있어도 강제 재빌드
        #[arg(long)]
        rebuild: bool,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// 대화형 질의 (/history, /clear, /status, /rebuild, /reset, /quit)
    Chat {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// 설정과 저장된 인덱스 상태
    Status,

    /// 저장된 인덱스 삭제
    Reset,
}

/// 검색 파라미터
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// 검색 결과 수
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// 최소 유사도 (0.0 ~ 1.0)
    #[arg(short, long)]
    pub min_score: Option<f32>,

    /// 근거 청크 표시
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Index { rebuild } => cmd_index(config, rebuild).await,
        Commands::Ask { question, query } => cmd_ask(config, &question, &query).await,
        Commands::Chat { query } => cmd_chat(config, &query).await,
        Commands::Status => cmd_status(&config),
        Commands::Reset => cmd_reset(config).await,
    }
}

/// 설정 로드 후 CLI 플래그 적용 (가장 높은 우선순위)
fn load_config(args: &GlobalArgs) -> Result<RagConfig> {
    let mut config = RagConfig::load(args.config.as_deref()).context("설정 로드 실패")?;

    if let Some(ref docs) = args.docs {
        config.documents_dir = docs.clone();
    }
    if let Some(ref model) = args.embedding_model {
        config.embedding_model = model.clone();
    }
    if let Some(ref model) = args.generation_model {
        config.generation_model = model.clone();
    }
    if let Some(ref store) = args.store {
        config.index.store_path = Some(store.clone());
    }
    if args.no_store {
        config.index.store_path = None;
    }

    config.validate().context("잘못된 설정")?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱싱 명령어 (index)
async fn cmd_index(config: RagConfig, rebuild: bool) -> Result<()> {
    println!("[*] 문서 디렉토리: {}", config.documents_dir.display());

    let pipeline = Pipeline::new(config).context("파이프라인 생성 실패")?;
    let status = if rebuild {
        pipeline.rebuild().await
    } else {
        pipeline.initialize_default().await
    }
    .context("인덱싱 실패")?;

    print_status(&status);
    if status.chunk_count == 0 {
        println!("[!] 인덱싱된 청크가 없습니다. 모든 질문에 고정 응답이 반환됩니다.");
    }

    Ok(())
}

/// 질의 명령어 (ask)
async fn cmd_ask(config: RagConfig, question: &str, args: &QueryArgs) -> Result<()> {
    let (top_k, min_score) = query_params(&config, args);

    let pipeline = Pipeline::new(config).context("파이프라인 생성 실패")?;
    pipeline
        .initialize_default()
        .await
        .context("파이프라인 초기화 실패")?;

    let answer = pipeline
        .query(question, top_k, min_score)
        .await
        .context("질의 실패")?;

    print_answer(&answer);
    if args.verbose {
        if let Some(turn) = pipeline.history().last() {
            print_evidence(&turn.retrieval.chunks);
        }
    }

    Ok(())
}

/// 대화형 명령어 (chat)
async fn cmd_chat(config: RagConfig, args: &QueryArgs) -> Result<()> {
    let (top_k, min_score) = query_params(&config, args);

    let pipeline = Pipeline::new(config).context("파이프라인 생성 실패")?;
    let status = pipeline
        .initialize_default()
        .await
        .context("파이프라인 초기화 실패")?;
    print_status(&status);
    println!("[*] 질문을 입력하세요 (/quit 종료, /history, /clear, /status, /rebuild, /reset)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/history" => {
                let history = pipeline.history();
                if history.is_empty() {
                    println!("[!] 대화 기록이 없습니다.");
                }
                for turn in history {
                    println!(
                        "#{} [{}] Q: {}",
                        turn.sequence,
                        turn.created_at.format("%H:%M:%S"),
                        turn.question
                    );
                    println!("     A: {}", truncate_text(&turn.answer.text, 200));
                }
            }
            "/clear" => {
                pipeline.clear_history();
                println!("[OK] 대화 기록 삭제됨");
            }
            "/status" => print_status(&pipeline.status()),
            "/rebuild" => match pipeline.rebuild().await {
                Ok(status) => print_status(&status),
                Err(e) => println!("[!] 재빌드 실패: {}", e),
            },
            "/reset" => {
                pipeline.reset().await.context("초기화 실패")?;
                println!("[OK] 인덱스와 대화 기록을 삭제했습니다. /rebuild로 다시 인덱싱하세요.");
            }
            question => match pipeline.query(question, top_k, min_score).await {
                Ok(answer) => {
                    print_answer(&answer);
                    if args.verbose {
                        if let Some(turn) = pipeline.history().last() {
                            print_evidence(&turn.retrieval.chunks);
                        }
                    }
                }
                Err(RagError::PipelineNotReady(state)) => {
                    println!("[!] 파이프라인이 준비되지 않았습니다 (상태: {})", state);
                }
                Err(e) => println!("[!] 오류: {}", e),
            },
        }
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 프로세스마다 파이프라인이 새로 만들어지므로 저장된 인덱스 메타를 보여줍니다.
fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("grounded-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 문서 디렉토리: {}", config.documents_dir.display());
    println!("[*] 임베딩 모델: {}", config.embedding_model);
    println!("[*] 생성 모델: {}", config.generation_model);
    println!(
        "[*] 청크: {}자 (겹침 {}자), top_k {}, min_score {}",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
        config.retrieval.top_k,
        config.retrieval.min_score
    );

    let Some(ref path) = config.index.store_path else {
        println!("[*] 인덱스 저장소: 사용 안 함 (메모리 전용)");
        return Ok(());
    };

    if !path.exists() {
        println!("[!] 인덱스 저장소 없음: {}", path.display());
        return Ok(());
    }

    let store = IndexStore::open(path).context("인덱스 저장소 열기 실패")?;
    match store.meta().context("인덱스 메타 조회 실패")? {
        Some(meta) => {
            println!("[OK] 인덱스 저장소: {}", path.display());
            println!(
                "     {} 청크 | {} ({}차원) | {}",
                store.entry_count()?,
                meta.embedding_model,
                meta.dimension,
                meta.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
        None => println!("[!] 인덱스 저장소가 비어 있습니다: {}", path.display()),
    }

    Ok(())
}

/// 초기화 명령어 (reset)
async fn cmd_reset(config: RagConfig) -> Result<()> {
    let pipeline = Pipeline::new(config).context("파이프라인 생성 실패")?;
    pipeline.reset().await.context("초기화 실패")?;
    println!("[OK] 저장된 인덱스를 삭제했습니다.");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn query_params(config: &RagConfig, args: &QueryArgs) -> (usize, f32) {
    (
        args.top_k.unwrap_or(config.retrieval.top_k),
        args.min_score.unwrap_or(config.retrieval.min_score),
    )
}

fn print_status(status: &PipelineStatus) {
    println!("[*] 상태: {}", status.state);
    println!(
        "[OK] {} 청크 / {} 문서{}",
        status.chunk_count,
        status.document_count,
        if status.reused_index {
            " (저장된 인덱스 재사용)"
        } else {
            ""
        }
    );
    if let Some(ref failure) = status.failure {
        println!("[!] 실패 원인: {}", failure);
    }
}

fn print_answer(answer: &Answer) {
    if answer.is_fallback() {
        println!("\n[!] {}", answer.text);
        return;
    }

    println!("\n{}", answer.text);
    if !answer.sources.is_empty() {
        println!(
            "\n[출처] {} (신뢰도: {:.2})",
            answer.sources.join(", "),
            answer.confidence
        );
    }
}

fn print_evidence(chunks: &[crate::knowledge::RetrievedChunk]) {
    for (i, chunk) in chunks.iter().enumerate() {
        let page = chunk
            .page
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();
        println!(
            "  {}. [{:.4}] {}{}: {}",
            i + 1,
            chunk.score,
            chunk.source,
            page,
            truncate_text(&chunk.preview(), 120)
        );
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
