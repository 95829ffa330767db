use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::{
    host::{
        expect_array, expect_number, expect_numbers, expect_string, native, Arity, HostBridge,
        HostError, HostResult, NativeNamespace,
    },
    value::Value,
};

const MAX_RANGE_LEN: usize = 10_000_000;

/// Largest scoring matrix `Align.alignDna` will allocate, in cells.
pub const MAX_ALIGN_CELLS: usize = 16_000_000;

const MATCH_SCORE: i64 = 2;
const MISMATCH_SCORE: i64 = -1;
const GAP_SCORE: i64 = -2;

static SHARED: Lazy<Arc<HostBridge>> = Lazy::new(|| Arc::new(standard_bridge()));

/// The process-wide built-in bridge, built on first use.
pub fn shared() -> Arc<HostBridge> {
    Arc::clone(&SHARED)
}

pub fn standard_bridge() -> HostBridge {
    HostBridge::new()
        .with(core())
        .with(seq())
        .with(stats())
        .with(align())
}

pub fn core() -> NativeNamespace {
    NativeNamespace::new("Core")
        .with(native("len", Arity::exact(1), core_len))
        .with(native("range", Arity::between(2, 3), core_range))
        .with(native("keys", Arity::exact(1), core_keys))
        .with(native("values", Arity::exact(1), core_values))
        .with(native("push", Arity::exact(2), core_push))
        .with(native("round", Arity::between(1, 2), core_round))
        .with(native("abs", Arity::exact(1), core_abs))
        .with(native("sqrt", Arity::exact(1), core_sqrt))
        .with(native("pow", Arity::exact(2), core_pow))
        .with(native("join", Arity::between(1, 2), core_join))
        .with(native("split", Arity::exact(2), core_split))
        .with(native("upper", Arity::exact(1), core_upper))
        .with(native("lower", Arity::exact(1), core_lower))
        .with(native("sha256", Arity::exact(1), core_sha256))
        .with(native("typeOf", Arity::exact(1), core_type_of))
}

pub fn seq() -> NativeNamespace {
    NativeNamespace::new("Seq")
        .with(native("gcContent", Arity::exact(1), seq_gc_content))
        .with(native("reverseComplement", Arity::exact(1), seq_reverse_complement))
        .with(native("transcribe", Arity::exact(1), seq_transcribe))
        .with(native("validate", Arity::between(1, 2), seq_validate))
        .with(native("kmerCount", Arity::exact(2), seq_kmer_count))
        .with(native("parseFasta", Arity::exact(1), seq_parse_fasta))
}

pub fn stats() -> NativeNamespace {
    NativeNamespace::new("Stats")
        .with(native("sum", Arity::exact(1), stats_sum))
        .with(native("mean", Arity::exact(1), stats_mean))
        .with(native("median", Arity::exact(1), stats_median))
        .with(native("min", Arity::exact(1), stats_min))
        .with(native("max", Arity::exact(1), stats_max))
        .with(native("variance", Arity::exact(1), stats_variance))
        .with(native("stdDev", Arity::exact(1), stats_std_dev))
        .with(native("describe", Arity::exact(1), stats_describe))
        .with(native("pearson", Arity::exact(2), stats_pearson))
}

pub fn align() -> NativeNamespace {
    NativeNamespace::new("Align").with(native("alignDna", Arity::between(2, 3), align_dna))
}

fn expect_count(value: &Value, name: &str) -> Result<usize, HostError> {
    let n = expect_number(value, name)?;
    if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
        return Err(HostError::failed(format!(
            "`{name}` expected a non-negative integer but found {n}"
        )));
    }
    Ok(n as usize)
}

fn core_len(args: &[Value]) -> HostResult {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(HostError::ArgumentType {
                function: "Core.len".into(),
                expected: "string, array or object",
                found: other.type_name(),
            })
        }
    };
    Ok(Value::number(len as f64))
}

fn core_range(args: &[Value]) -> HostResult {
    let start = expect_number(&args[0], "Core.range")?;
    let end = expect_number(&args[1], "Core.range")?;
    let step = match args.get(2) {
        Some(step) => expect_number(step, "Core.range")?,
        None => 1.0,
    };
    if step == 0.0 || !step.is_finite() {
        return Err(HostError::failed("`Core.range` step must be a non-zero number"));
    }
    let mut values = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
        if values.len() >= MAX_RANGE_LEN {
            return Err(HostError::failed(format!(
                "`Core.range` would produce more than {MAX_RANGE_LEN} values"
            )));
        }
        values.push(Value::number(current));
        current += step;
    }
    Ok(Value::array(values))
}

fn core_keys(args: &[Value]) -> HostResult {
    match &args[0] {
        Value::Object(map) => Ok(Value::array(
            map.keys().map(|key| Value::string(key.clone())).collect(),
        )),
        other => Err(HostError::ArgumentType {
            function: "Core.keys".into(),
            expected: "object",
            found: other.type_name(),
        }),
    }
}

fn core_values(args: &[Value]) -> HostResult {
    match &args[0] {
        Value::Object(map) => Ok(Value::array(map.values().cloned().collect())),
        other => Err(HostError::ArgumentType {
            function: "Core.values".into(),
            expected: "object",
            found: other.type_name(),
        }),
    }
}

/// Returns a new array; the argument is left untouched.
fn core_push(args: &[Value]) -> HostResult {
    let mut items = expect_array(&args[0], "Core.push")?.to_vec();
    items.push(args[1].clone());
    Ok(Value::array(items))
}

fn core_round(args: &[Value]) -> HostResult {
    let x = expect_number(&args[0], "Core.round")?;
    let digits = match args.get(1) {
        Some(digits) => expect_count(digits, "Core.round")?,
        None => 0,
    };
    let factor = 10f64.powi(digits.min(15) as i32);
    Ok(Value::number((x * factor).round() / factor))
}

fn core_abs(args: &[Value]) -> HostResult {
    Ok(Value::number(expect_number(&args[0], "Core.abs")?.abs()))
}

fn core_sqrt(args: &[Value]) -> HostResult {
    Ok(Value::number(expect_number(&args[0], "Core.sqrt")?.sqrt()))
}

fn core_pow(args: &[Value]) -> HostResult {
    let base = expect_number(&args[0], "Core.pow")?;
    let exp = expect_number(&args[1], "Core.pow")?;
    Ok(Value::number(base.powf(exp)))
}

fn core_join(args: &[Value]) -> HostResult {
    let items = expect_array(&args[0], "Core.join")?;
    let separator = match args.get(1) {
        Some(sep) => expect_string(sep, "Core.join")?,
        None => ",",
    };
    let parts: Vec<String> = items.iter().map(Value::to_text).collect();
    Ok(Value::string(parts.join(separator)))
}

fn core_split(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Core.split")?;
    let separator = expect_string(&args[1], "Core.split")?;
    let parts = if separator.is_empty() {
        text.chars().map(|ch| Value::string(ch.to_string())).collect()
    } else {
        text.split(separator).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn core_upper(args: &[Value]) -> HostResult {
    Ok(Value::string(expect_string(&args[0], "Core.upper")?.to_uppercase()))
}

fn core_lower(args: &[Value]) -> HostResult {
    Ok(Value::string(expect_string(&args[0], "Core.lower")?.to_lowercase()))
}

fn core_sha256(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Core.sha256")?;
    let digest = Sha256::digest(text.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(Value::string(hex))
}

fn core_type_of(args: &[Value]) -> HostResult {
    Ok(Value::string(args[0].type_name()))
}

fn nucleotides(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().filter(|ch| !ch.is_whitespace())
}

/// Fraction of G/C bases, in `0..=1`.
fn seq_gc_content(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.gcContent")?;
    let (mut total, mut gc) = (0usize, 0usize);
    for base in nucleotides(text) {
        total += 1;
        if matches!(base.to_ascii_uppercase(), 'G' | 'C') {
            gc += 1;
        }
    }
    if total == 0 {
        return Ok(Value::number(0.0));
    }
    Ok(Value::number(gc as f64 / total as f64))
}

fn complement(base: char) -> Option<char> {
    let flipped = match base.to_ascii_uppercase() {
        'A' => 'T',
        'T' | 'U' => 'A',
        'C' => 'G',
        'G' => 'C',
        'N' => 'N',
        _ => return None,
    };
    Some(if base.is_ascii_lowercase() {
        flipped.to_ascii_lowercase()
    } else {
        flipped
    })
}

fn seq_reverse_complement(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.reverseComplement")?;
    let mut out = String::with_capacity(text.len());
    for base in nucleotides(text).collect::<Vec<_>>().into_iter().rev() {
        let flipped = complement(base)
            .ok_or_else(|| HostError::failed(format!("invalid nucleotide `{base}`")))?;
        out.push(flipped);
    }
    Ok(Value::string(out))
}

fn seq_transcribe(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.transcribe")?;
    let rna = nucleotides(text)
        .map(|base| match base {
            'T' => 'U',
            't' => 'u',
            other => other,
        })
        .collect::<String>();
    Ok(Value::string(rna))
}

fn seq_validate(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.validate")?;
    let alphabet = match args.get(1) {
        Some(kind) => expect_string(kind, "Seq.validate")?,
        None => "dna",
    };
    let allowed: &str = match alphabet.to_ascii_lowercase().as_str() {
        "dna" => "ACGTN",
        "rna" => "ACGUN",
        "protein" => "ACDEFGHIKLMNPQRSTVWYX*",
        other => {
            return Err(HostError::failed(format!(
                "unknown alphabet `{other}`, expected dna, rna or protein"
            )))
        }
    };
    let valid = nucleotides(text).all(|ch| allowed.contains(ch.to_ascii_uppercase()));
    Ok(Value::Bool(valid))
}

fn seq_kmer_count(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.kmerCount")?;
    let k = expect_count(&args[1], "Seq.kmerCount")?;
    if k == 0 {
        return Err(HostError::failed("`Seq.kmerCount` k must be at least 1"));
    }
    let bases: Vec<char> = nucleotides(text).map(|ch| ch.to_ascii_uppercase()).collect();
    let mut counts: IndexMap<String, Value> = IndexMap::new();
    for window in bases.windows(k) {
        let kmer: String = window.iter().collect();
        let entry = counts.entry(kmer).or_insert(Value::number(0.0));
        if let Value::Number(n) = entry {
            *n += 1.0;
        }
    }
    Ok(Value::Object(counts))
}

fn seq_parse_fasta(args: &[Value]) -> HostResult {
    let text = expect_string(&args[0], "Seq.parseFasta")?;
    let mut records = Vec::new();
    let mut current: Option<(String, String, String)> = None;
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(fasta_record(record));
            }
            let (id, description) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
            current = Some((id.to_string(), description.trim().to_string(), String::new()));
        } else {
            let Some((_, _, sequence)) = current.as_mut() else {
                return Err(HostError::failed("FASTA input must start with a `>` header"));
            };
            sequence.push_str(line);
        }
    }
    if let Some(record) = current {
        records.push(fasta_record(record));
    }
    Ok(Value::array(records))
}

fn fasta_record((id, description, sequence): (String, String, String)) -> Value {
    let length = sequence.chars().count() as f64;
    Value::object([
        ("id", Value::string(id)),
        ("description", Value::string(description)),
        ("sequence", Value::string(sequence)),
        ("length", Value::number(length)),
    ])
}

fn non_empty(values: Vec<f64>, name: &str) -> Result<Vec<f64>, HostError> {
    if values.is_empty() {
        return Err(HostError::failed(format!("`{name}` requires at least one value")));
    }
    Ok(values)
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample variance; a single value has variance zero.
fn variance_of(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_of(values);
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    squares / (values.len() - 1) as f64
}

fn stats_sum(args: &[Value]) -> HostResult {
    let values = expect_numbers(&args[0], "Stats.sum")?;
    Ok(Value::number(values.iter().sum()))
}

fn stats_mean(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.mean")?, "Stats.mean")?;
    Ok(Value::number(mean_of(&values)))
}

fn stats_median(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.median")?, "Stats.median")?;
    Ok(Value::number(median_of(&values)))
}

fn stats_min(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.min")?, "Stats.min")?;
    Ok(Value::number(values.iter().copied().fold(f64::INFINITY, f64::min)))
}

fn stats_max(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.max")?, "Stats.max")?;
    Ok(Value::number(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)))
}

fn stats_variance(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.variance")?, "Stats.variance")?;
    Ok(Value::number(variance_of(&values)))
}

fn stats_std_dev(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.stdDev")?, "Stats.stdDev")?;
    Ok(Value::number(variance_of(&values).sqrt()))
}

fn stats_describe(args: &[Value]) -> HostResult {
    let values = non_empty(expect_numbers(&args[0], "Stats.describe")?, "Stats.describe")?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Value::object([
        ("count", Value::number(values.len() as f64)),
        ("mean", Value::number(mean_of(&values))),
        ("std_dev", Value::number(variance_of(&values).sqrt())),
        ("min", Value::number(min)),
        ("max", Value::number(max)),
        ("median", Value::number(median_of(&values))),
    ]))
}

fn stats_pearson(args: &[Value]) -> HostResult {
    let xs = expect_numbers(&args[0], "Stats.pearson")?;
    let ys = expect_numbers(&args[1], "Stats.pearson")?;
    if xs.len() != ys.len() {
        return Err(HostError::failed(format!(
            "`Stats.pearson` needs equal-length inputs, got {} and {}",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < 2 {
        return Err(HostError::failed("`Stats.pearson` requires at least two pairs"));
    }
    let (mx, my) = (mean_of(&xs), mean_of(&ys));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return Err(HostError::failed("`Stats.pearson` is undefined for constant input"));
    }
    Ok(Value::number(cov / (vx.sqrt() * vy.sqrt())))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AlignMode {
    Global,
    Local,
}

fn align_dna(args: &[Value]) -> HostResult {
    let query: Vec<char> = nucleotides(expect_string(&args[0], "Align.alignDna")?)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    let target: Vec<char> = nucleotides(expect_string(&args[1], "Align.alignDna")?)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    let mode = match args.get(2) {
        None => AlignMode::Global,
        Some(mode) => match expect_string(mode, "Align.alignDna")? {
            "global" => AlignMode::Global,
            "local" => AlignMode::Local,
            other => {
                return Err(HostError::failed(format!(
                    "unknown alignment mode `{other}`, expected global or local"
                )))
            }
        },
    };
    let cells = (query.len() + 1).saturating_mul(target.len() + 1);
    if cells > MAX_ALIGN_CELLS {
        return Err(HostError::failed(format!(
            "`Align.alignDna` inputs of length {} and {} exceed the limit of {MAX_ALIGN_CELLS} matrix cells",
            query.len(),
            target.len()
        )));
    }
    Ok(align_sequences(&query, &target, mode))
}

/// Needleman-Wunsch (global) or Smith-Waterman (local) with linear gaps.
fn align_sequences(query: &[char], target: &[char], mode: AlignMode) -> Value {
    let (n, m) = (query.len(), target.len());
    let floor = |score: i64| match mode {
        AlignMode::Global => score,
        AlignMode::Local => score.max(0),
    };

    let mut dp = vec![vec![0i64; m + 1]; n + 1];
    for i in 1..=n {
        dp[i][0] = floor(dp[i - 1][0] + GAP_SCORE);
    }
    for j in 1..=m {
        dp[0][j] = floor(dp[0][j - 1] + GAP_SCORE);
    }

    let mut best = (0i64, 0usize, 0usize);
    for i in 1..=n {
        for j in 1..=m {
            let pair = if query[i - 1] == target[j - 1] {
                MATCH_SCORE
            } else {
                MISMATCH_SCORE
            };
            let score = (dp[i - 1][j - 1] + pair)
                .max(dp[i - 1][j] + GAP_SCORE)
                .max(dp[i][j - 1] + GAP_SCORE);
            dp[i][j] = floor(score);
            if dp[i][j] > best.0 {
                best = (dp[i][j], i, j);
            }
        }
    }

    let (score, mut i, mut j) = match mode {
        AlignMode::Global => (dp[n][m], n, m),
        AlignMode::Local => best,
    };

    let mut aligned_query = Vec::new();
    let mut aligned_target = Vec::new();
    while i > 0 || j > 0 {
        if mode == AlignMode::Local && dp[i][j] == 0 {
            break;
        }
        if i > 0 && j > 0 {
            let pair = if query[i - 1] == target[j - 1] {
                MATCH_SCORE
            } else {
                MISMATCH_SCORE
            };
            if dp[i][j] == dp[i - 1][j - 1] + pair {
                aligned_query.push(query[i - 1]);
                aligned_target.push(target[j - 1]);
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && dp[i][j] == floor(dp[i - 1][j] + GAP_SCORE) {
            aligned_query.push(query[i - 1]);
            aligned_target.push('-');
            i -= 1;
        } else if j > 0 {
            aligned_query.push('-');
            aligned_target.push(target[j - 1]);
            j -= 1;
        } else {
            aligned_query.push(query[i - 1]);
            aligned_target.push('-');
            i -= 1;
        }
    }
    aligned_query.reverse();
    aligned_target.reverse();

    let matches = aligned_query
        .iter()
        .zip(&aligned_target)
        .filter(|(q, t)| q == t && **q != '-')
        .count();
    let identity = if aligned_query.is_empty() {
        0.0
    } else {
        matches as f64 / aligned_query.len() as f64
    };

    Value::object([
        ("aligned_query", Value::string(aligned_query.into_iter().collect::<String>())),
        ("aligned_target", Value::string(aligned_target.into_iter().collect::<String>())),
        ("score", Value::number(score as f64)),
        ("identity", Value::number(identity)),
    ])
}
