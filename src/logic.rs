use itertools::{iproduct, Itertools};
use varisat::{ExtendFormula, Lit};

/// Clauses defining `output` as the conjunction of `inputs`; `output <-> (A * B * ...)`.
pub(crate) fn and_gate(output: Lit, inputs: &[Lit]) -> Vec<Vec<Lit>> {
    let mut clauses = Vec::with_capacity(inputs.len() + 1);

    // output implies every input; (!O + A) * (!O + B) * ...
    clauses.extend(inputs.iter().map(|input| vec![!output, *input]));
    // all inputs together imply output; (O + !A + !B + ...)
    clauses.push(std::iter::once(output).chain(inputs.iter().map(|input| !*input)).collect_vec());

    clauses
}

/// A unary counter over some literals, truncated at a cap.
///
/// Output `k` (1-based) is equivalent to "at least `k` inputs hold" for every `k` up to the cap,
/// in both directions, so outputs may be used under either polarity.
pub(crate) struct Totalizer {
    outputs: Vec<Lit>,
}

impl Totalizer {
    /// Add the counter for `inputs` to `formula`. `cap` must be at least 1.
    pub(crate) fn encode(formula: &mut impl ExtendFormula, inputs: &[Lit], cap: usize) -> Self {
        Self { outputs: count(formula, inputs, cap.max(1)) }
    }

    /// The literal equivalent to "at least `k` inputs hold", or `None` if `k` is zero or beyond the cap.
    pub(crate) fn at_least(&self, k: usize) -> Option<Lit> {
        k.checked_sub(1).and_then(|index| self.outputs.get(index)).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.outputs.len()
    }
}

fn count(formula: &mut impl ExtendFormula, inputs: &[Lit], cap: usize) -> Vec<Lit> {
    if inputs.len() <= 1 {
        return inputs.to_vec();
    }

    let (left, right) = inputs.split_at(inputs.len() / 2);
    let left = count(formula, left, cap);
    let right = count(formula, right, cap);
    merge(formula, &left, &right, cap)
}

fn merge(formula: &mut impl ExtendFormula, a: &[Lit], b: &[Lit], cap: usize) -> Vec<Lit> {
    let len = (a.len() + b.len()).min(cap);
    let sum = (0..len).map(|_| formula.new_lit()).collect_vec();

    // at least i in a and at least j in b; (!a_i + !b_j + r_i+j)
    for (i, j) in iproduct!(0..=a.len(), 0..=b.len()) {
        if i + j == 0 {
            continue;
        }
        let mut clause = Vec::with_capacity(3);
        if i > 0 {
            clause.push(!a[i - 1]);
        }
        if j > 0 {
            clause.push(!b[j - 1]);
        }
        clause.push(sum[(i + j).min(len) - 1]);
        formula.add_clause(&clause);
    }

    // at most i in a and at most j in b; (a_i+1 + b_j+1 + !r_i+j+1)
    // a missing a_i+1 means a cannot reach i + 1 at all, since i + j + 1 <= cap
    for (i, j) in iproduct!(0..=a.len(), 0..=b.len()) {
        if i + j + 1 > len {
            continue;
        }
        let mut clause = Vec::with_capacity(3);
        clause.push(!sum[i + j]);
        if i < a.len() {
            clause.push(a[i]);
        }
        if j < b.len() {
            clause.push(b[j]);
        }
        formula.add_clause(&clause);
    }

    sum
}
