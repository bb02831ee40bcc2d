//! Byte-pair encoding over vocabulary IDs.
//!
//! Merges are keyed by ID pairs, `(left_id, right_id) -> (rank, merged_id)`,
//! so the merge loop never concatenates strings. A piece is split into one
//! symbol per character, then the lowest-ranked adjacent pair is merged until
//! no pair has a rank.
//!
//! The symbols live in a flat-array doubly-linked list: merging two symbols is
//! O(1) and only the neighbours of the merged node need new ranks. Short
//! pieces find the next merge with a linear scan; long ones use a binary heap
//! with lazy invalidation.

use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::model::Token;
use super::vocab::Vocabulary;

type Rank = u32;

const NONE: u32 = u32::MAX;

/// Pieces with at most this many symbols use the linear-scan merge.
const LINEAR_SCAN_LIMIT: usize = 32;

/// Options of a BPE model besides its vocabulary and merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BpeOptions {
    pub unk_token: Option<String>,
    pub continuing_subword_prefix: Option<String>,
    pub end_of_word_suffix: Option<String>,
    pub byte_fallback: bool,
    pub fuse_unk: bool,
    /// Emit a piece that is itself a vocabulary token without running merges.
    pub ignore_merges: bool,
}

/// A BPE model: merge table plus the rules for seeding symbols.
#[derive(Debug, Clone)]
pub struct Bpe {
    merges: FxHashMap<(u32, u32), (Rank, u32)>,
    unk_id: Option<u32>,
    byte_fallback_ids: [Option<u32>; 256],
    options: BpeOptions,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    id: u32,
    start: usize,
    end: usize,
    rank: Rank,
    prev: u32,
    next: u32,
}

impl Bpe {
    /// Build the merge table. The rank of a merge is its index in `merges`;
    /// merges whose operands or result are not in `vocab` are skipped.
    pub fn new(vocab: &Vocabulary, merges: &[(String, String)], options: BpeOptions) -> Self {
        let mut table: FxHashMap<(u32, u32), (Rank, u32)> =
            FxHashMap::with_capacity_and_hasher(merges.len(), Default::default());
        let mut ignored = 0usize;

        for (rank, (left, right)) in merges.iter().enumerate() {
            // The right operand carries the continuation prefix; the merged token only once.
            let tail = match &options.continuing_subword_prefix {
                Some(prefix) => right.strip_prefix(prefix.as_str()).unwrap_or(right),
                None => right.as_str(),
            };
            let merged = format!("{left}{tail}");
            match (
                vocab.token_to_id(left),
                vocab.token_to_id(right),
                vocab.token_to_id(&merged),
            ) {
                (Some(l), Some(r), Some(m)) => {
                    table.entry((l, r)).or_insert((rank as Rank, m));
                }
                _ => ignored += 1,
            }
        }
        if ignored > 0 {
            log::warn!(
                "ignored {ignored} of {} merges referencing tokens missing from the vocabulary",
                merges.len()
            );
        }

        let mut byte_fallback_ids = [None; 256];
        if options.byte_fallback {
            for (byte, slot) in byte_fallback_ids.iter_mut().enumerate() {
                *slot = vocab.token_to_id(&format!("<0x{byte:02X}>"));
            }
        }

        let unk_id = options
            .unk_token
            .as_deref()
            .and_then(|unk| vocab.token_to_id(unk));

        Self {
            merges: table,
            unk_id,
            byte_fallback_ids,
            options,
        }
    }

    pub fn unk_token(&self) -> Option<&str> {
        self.options.unk_token.as_deref()
    }

    /// Number of usable merges.
    pub fn merge_count(&self) -> usize {
        self.merges.len()
    }

    /// Tokenize one pre-tokenized piece. Offsets are byte ranges within `word`.
    pub fn tokenize(&self, vocab: &Vocabulary, word: &str) -> Vec<Token> {
        if word.is_empty() {
            return Vec::new();
        }

        if self.options.ignore_merges {
            let whole: Cow<'_, str> = match &self.options.end_of_word_suffix {
                Some(suffix) => Cow::Owned(format!("{word}{suffix}")),
                None => Cow::Borrowed(word),
            };
            if let Some(id) = vocab.token_to_id(&whole) {
                return vec![Token::new(id, whole.into_owned(), (0, word.len()))];
            }
        }

        let nodes = self.seed(vocab, word);
        let merged = if nodes.len() <= LINEAR_SCAN_LIMIT {
            self.merge_linear(nodes)
        } else {
            self.merge_heap(nodes)
        };

        merged
            .into_iter()
            .map(|n| {
                let value = vocab.id_to_token(n.id).unwrap_or_default().to_string();
                Token::new(n.id, value, (n.start, n.end))
            })
            .collect()
    }

    /// One node per character; unknown characters become byte tokens or the unknown token.
    fn seed(&self, vocab: &Vocabulary, word: &str) -> Vec<Node> {
        let mut nodes: Vec<Node> = Vec::with_capacity(word.len());
        let mut last_is_unk = false;
        let mut symbol = String::new();

        for (start, ch) in word.char_indices() {
            let end = start + ch.len_utf8();
            symbol.clear();
            if start > 0 {
                if let Some(prefix) = &self.options.continuing_subword_prefix {
                    symbol.push_str(prefix);
                }
            }
            symbol.push(ch);
            if end == word.len() {
                if let Some(suffix) = &self.options.end_of_word_suffix {
                    symbol.push_str(suffix);
                }
            }

            if let Some(id) = vocab.token_to_id(&symbol) {
                nodes.push(Node::new(id, start, end));
                last_is_unk = false;
                continue;
            }

            if self.options.byte_fallback {
                let mut buf = [0u8; 4];
                let ids: Option<Vec<u32>> = ch
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| self.byte_fallback_ids[b as usize])
                    .collect();
                if let Some(ids) = ids {
                    nodes.extend(ids.into_iter().map(|id| Node::new(id, start, end)));
                    last_is_unk = false;
                    continue;
                }
            }

            match self.unk_id {
                Some(_) if self.options.fuse_unk && last_is_unk => {
                    if let Some(last) = nodes.last_mut() {
                        last.end = end;
                    }
                }
                Some(unk) => {
                    nodes.push(Node::new(unk, start, end));
                    last_is_unk = true;
                }
                None => {
                    log::debug!("dropping {ch:?}: not in the vocabulary and no unknown token");
                }
            }
        }

        for (i, node) in nodes.iter_mut().enumerate() {
            node.prev = if i == 0 { NONE } else { (i - 1) as u32 };
            node.next = (i + 1) as u32;
        }
        if let Some(last) = nodes.last_mut() {
            last.next = NONE;
        }
        nodes
    }

    #[inline]
    fn pair(&self, nodes: &[Node], i: usize) -> Option<(Rank, u32)> {
        let j = nodes[i].next;
        if j == NONE {
            return None;
        }
        self.merges.get(&(nodes[i].id, nodes[j as usize].id)).copied()
    }

    #[inline]
    fn refresh_rank(&self, nodes: &mut [Node], i: usize) -> Rank {
        let rank = self.pair(nodes, i).map_or(Rank::MAX, |(r, _)| r);
        nodes[i].rank = rank;
        rank
    }

    /// Fuse node `i` with its successor, returning false if they no longer merge.
    fn fuse(&self, nodes: &mut [Node], i: usize) -> bool {
        let Some((_, merged_id)) = self.pair(nodes, i) else {
            return false;
        };
        let j = nodes[i].next as usize;
        nodes[i].id = merged_id;
        nodes[i].end = nodes[j].end;
        nodes[i].next = nodes[j].next;
        if nodes[j].next != NONE {
            nodes[nodes[j].next as usize].prev = i as u32;
        }
        nodes[j].rank = Rank::MAX;
        nodes[j].prev = NONE;
        true
    }

    fn merge_linear(&self, mut nodes: Vec<Node>) -> Vec<Node> {
        for i in 0..nodes.len() {
            self.refresh_rank(&mut nodes, i);
        }
        loop {
            let mut best = (Rank::MAX, NONE);
            let mut cur = if nodes.is_empty() { NONE } else { 0 };
            while cur != NONE {
                let node = &nodes[cur as usize];
                if node.rank < best.0 {
                    best = (node.rank, cur);
                }
                cur = node.next;
            }
            if best.0 == Rank::MAX {
                break;
            }
            let i = best.1 as usize;
            if !self.fuse(&mut nodes, i) {
                nodes[i].rank = Rank::MAX;
                continue;
            }
            self.refresh_rank(&mut nodes, i);
            let prev = nodes[i].prev;
            if prev != NONE {
                self.refresh_rank(&mut nodes, prev as usize);
            }
        }
        collect(nodes)
    }

    fn merge_heap(&self, mut nodes: Vec<Node>) -> Vec<Node> {
        let mut heap: BinaryHeap<Reverse<(Rank, u32)>> = BinaryHeap::with_capacity(nodes.len());
        for i in 0..nodes.len() {
            let rank = self.refresh_rank(&mut nodes, i);
            if rank != Rank::MAX {
                heap.push(Reverse((rank, i as u32)));
            }
        }

        while let Some(Reverse((rank, idx))) = heap.pop() {
            let i = idx as usize;
            // Stale entry: the node was merged away or its successor changed.
            if nodes[i].rank != rank || !self.fuse(&mut nodes, i) {
                continue;
            }
            let rank = self.refresh_rank(&mut nodes, i);
            if rank != Rank::MAX {
                heap.push(Reverse((rank, idx)));
            }
            let prev = nodes[i].prev;
            if prev != NONE {
                let rank = self.refresh_rank(&mut nodes, prev as usize);
                if rank != Rank::MAX {
                    heap.push(Reverse((rank, prev)));
                }
            }
        }
        collect(nodes)
    }
}

impl Node {
    fn new(id: u32, start: usize, end: usize) -> Self {
        Self {
            id,
            start,
            end,
            rank: Rank::MAX,
            prev: NONE,
            next: NONE,
        }
    }
}

fn collect(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    let mut cur = if nodes.is_empty() { NONE } else { 0 };
    while cur != NONE {
        out.push(nodes[cur as usize]);
        cur = nodes[cur as usize].next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vocab(tokens: &[&str]) -> Vocabulary {
        let map: HashMap<String, u32> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        Vocabulary::build(&map, &[]).unwrap()
    }

    fn merges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn ids(tokens: &[Token]) -> Vec<u32> {
        tokens.iter().map(|t| t.id).collect()
    }

    fn hello_model() -> (Vocabulary, Bpe) {
        let v = vocab(&["h", "e", "l", "o", "he", "ll", "hell", "hello", "[UNK]"]);
        let bpe = Bpe::new(
            &v,
            &merges(&[("h", "e"), ("l", "l"), ("he", "ll")]),
            BpeOptions {
                unk_token: Some("[UNK]".into()),
                ..Default::default()
            },
        );
        (v, bpe)
    }

    #[test]
    fn test_whole_piece_needs_ignore_merges() {
        let (v, bpe) = hello_model();
        // No merge produces "hello", so it stays split.
        assert_eq!(ids(&bpe.tokenize(&v, "hello")), vec![6, 3]);

        let eager = Bpe::new(
            &v,
            &merges(&[("h", "e"), ("l", "l"), ("he", "ll")]),
            BpeOptions {
                unk_token: Some("[UNK]".into()),
                ignore_merges: true,
                ..Default::default()
            },
        );
        let tokens = eager.tokenize(&v, "hello");
        assert_eq!(ids(&tokens), vec![7]);
        assert_eq!(tokens[0].offsets, (0, 5));
        assert_eq!(ids(&eager.tokenize(&v, "hellohe")), vec![6, 3, 4]);
    }

    #[test]
    fn test_merges_lowest_rank_first() {
        let (v, bpe) = hello_model();
        let tokens = bpe.tokenize(&v, "hellohe");
        assert_eq!(ids(&tokens), vec![6, 3, 4]);
        let offsets: Vec<_> = tokens.iter().map(|t| t.offsets).collect();
        assert_eq!(offsets, vec![(0, 4), (4, 5), (5, 7)]);
        assert_eq!(tokens[0].value, "hell");
    }

    #[test]
    fn test_heap_matches_linear() {
        let (v, bpe) = hello_model();
        let long = "hellohe".repeat(10);
        let tokens = bpe.tokenize(&v, &long);
        assert_eq!(ids(&tokens), [6, 3, 4].repeat(10));
    }

    #[test]
    fn test_missing_merge_operands_are_ignored() {
        let v = vocab(&["a", "b"]);
        let bpe = Bpe::new(&v, &merges(&[("a", "b"), ("a", "z")]), BpeOptions::default());
        assert_eq!(bpe.merge_count(), 0);
    }

    #[test]
    fn test_unknown_and_fuse_unk() {
        let (v, _) = hello_model();
        let fused = Bpe::new(
            &v,
            &[],
            BpeOptions {
                unk_token: Some("[UNK]".into()),
                fuse_unk: true,
                ..Default::default()
            },
        );
        let tokens = fused.tokenize(&v, "hxxe");
        assert_eq!(ids(&tokens), vec![0, 8, 1]);
        assert_eq!(tokens[1].offsets, (1, 3));

        let plain = Bpe::new(
            &v,
            &[],
            BpeOptions {
                unk_token: Some("[UNK]".into()),
                ..Default::default()
            },
        );
        assert_eq!(ids(&plain.tokenize(&v, "hxxe")), vec![0, 8, 8, 1]);
    }

    #[test]
    fn test_no_unknown_token_drops_fragment() {
        let v = vocab(&["a"]);
        let bpe = Bpe::new(&v, &[], BpeOptions::default());
        assert_eq!(ids(&bpe.tokenize(&v, "aza")), vec![0, 0]);
    }

    #[test]
    fn test_byte_fallback() {
        let v = vocab(&["a", "<0xC3>", "<0xA9>", "<unk>"]);
        let bpe = Bpe::new(
            &v,
            &[],
            BpeOptions {
                unk_token: Some("<unk>".into()),
                byte_fallback: true,
                ..Default::default()
            },
        );
        let tokens = bpe.tokenize(&v, "aé");
        assert_eq!(ids(&tokens), vec![0, 1, 2]);
        assert_eq!(tokens[1].offsets, (1, 3));
        assert_eq!(tokens[2].offsets, (1, 3));
        // No byte tokens for 'z': falls back to unk.
        assert_eq!(ids(&bpe.tokenize(&v, "z")), vec![3]);
    }

    #[test]
    fn test_continuing_subword_prefix_and_suffix() {
        let v = vocab(&["a", "##b", "ab", "c</w>", "abc</w>"]);
        let bpe = Bpe::new(
            &v,
            &merges(&[("a", "##b")]),
            BpeOptions {
                continuing_subword_prefix: Some("##".into()),
                ..Default::default()
            },
        );
        assert_eq!(ids(&bpe.tokenize(&v, "ab")), vec![2]);

        let v = vocab(&["a", "b", "c</w>", "ab", "abc</w>"]);
        let bpe = Bpe::new(
            &v,
            &merges(&[("a", "b"), ("ab", "c</w>")]),
            BpeOptions {
                end_of_word_suffix: Some("</w>".into()),
                ..Default::default()
            },
        );
        // "abc" + suffix is a vocabulary entry.
        assert_eq!(ids(&bpe.tokenize(&v, "abc")), vec![4]);
        assert_eq!(ids(&bpe.tokenize(&v, "ababc")), vec![3, 4]);
    }
}
