// ============================================================
// Layer 5: Dynamic Memory Network (DMN+)
// ============================================================
// The question-answering model trained by the experiment loop.
//
//   context ──embed──► positional encoding ──► bi-GRU ──► facts
//   question ─embed──► GRU ──────────────────────────────► q
//
//   m⁰ = q
//   for each pass:
//       gates  = softmax(W₂ tanh(W₁ [f∘q, f∘m, |f−q|, |f−m|]))
//       c      = AttentionGRU(facts, gates)
//       mᵗ⁺¹   = relu(W [mᵗ; c; q] + b)
//
//   logits = W_a [dropout(m); q]
//
// PAD_ID positions embed to zero, and the question encoding is
// the GRU state at each question's last real word.
//
// Dropout only fires on an autodiff backend, so the model
// returned by `valid()` is automatically in eval mode.
//
// Reference: Xiong, Merity & Socher (2016) DMN+
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        gru::{Gru, GruConfig},
        Initializer,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::vocabulary::PAD_ID;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct DmnConfig {
    pub hidden_size: usize,
    pub vocab_size:  usize,
    /// Episodic memory passes
    #[config(default = 3)]
    pub num_passes:  usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl DmnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DmnModel<B> {
        let h = self.hidden_size;

        // Word embeddings keep a uniform init; every linear layer is Xavier.
        let bound = 3f64.sqrt();
        let word_embedding = EmbeddingConfig::new(self.vocab_size, h)
            .with_initializer(Initializer::Uniform { min: -bound, max: bound })
            .init(device);

        let input_module = InputModule {
            forward_gru:  GruConfig::new(h, h, true).init(device),
            backward_gru: GruConfig::new(h, h, true).init(device),
            dropout:      DropoutConfig::new(self.dropout).init(),
        };

        let question_module = QuestionModule {
            gru: GruConfig::new(h, h, true).init(device),
        };

        let memory = EpisodicMemory {
            attention_gru: AttentionGru {
                wr: xavier_linear(h, h, device),
                ur: xavier_linear(h, h, device),
                w:  xavier_linear(h, h, device),
                u:  xavier_linear(h, h, device),
            },
            z1:          xavier_linear(4 * h, h, device),
            z2:          xavier_linear(h, 1, device),
            next_memory: xavier_linear(3 * h, h, device),
        };

        let answer_module = AnswerModule {
            dropout: DropoutConfig::new(self.dropout).init(),
            z:       xavier_linear(2 * h, self.vocab_size, device),
        };

        DmnModel {
            word_embedding,
            input_module,
            question_module,
            memory,
            answer_module,
            num_passes: self.num_passes,
        }
    }
}

fn xavier_linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::XavierNormal { gain: 1.0 })
        .init(device)
}

// ─── Input module ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct InputModule<B: Backend> {
    pub forward_gru:  Gru<B>,
    pub backward_gru: Gru<B>,
    pub dropout:      Dropout,
}

impl<B: Backend> InputModule<B> {
    /// [batch, sentences, words, hidden] → facts [batch, sentences, hidden]
    pub fn forward(&self, context: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, sentences, words, hidden] = context.dims();

        let encoding = position_encoding::<B>(words, hidden, &context.device())
            .reshape([1, 1, words, hidden])
            .expand([batch, sentences, words, hidden]);
        let encoded = (context * encoding)
            .sum_dim(2)
            .reshape([batch, sentences, hidden]);
        let encoded = self.dropout.forward(encoded);

        let forward  = self.forward_gru.forward(encoded.clone(), None);
        let backward = reverse_steps(self.backward_gru.forward(reverse_steps(encoded), None));
        forward + backward
    }
}

/// Positional weights l[j][d] = (1 − j/J) − (d/D)(1 − 2j/J), 1-based j and d.
/// Shape: [words, hidden]
pub fn position_encoding<B: Backend>(words: usize, hidden: usize, device: &B::Device) -> Tensor<B, 2> {
    let (jj, dd) = (words as f32, hidden as f32);
    let weights: Vec<f32> = (1..=words)
        .flat_map(|j| {
            let j = j as f32;
            (1..=hidden).map(move |d| {
                let d = d as f32;
                (1.0 - j / jj) - (d / dd) * (1.0 - 2.0 * j / jj)
            })
        })
        .collect();

    Tensor::<B, 1>::from_floats(weights.as_slice(), device).reshape([words, hidden])
}

/// Reverse a [batch, steps, features] tensor along the step axis.
fn reverse_steps<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, steps, _] = x.dims();
    let order: Vec<i32> = (0..steps as i32).rev().collect();
    let order = Tensor::<B, 1, Int>::from_ints(order.as_slice(), &x.device());
    x.select(1, order)
}

// ─── Question module ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct QuestionModule<B: Backend> {
    pub gru: Gru<B>,
}

impl<B: Backend> QuestionModule<B> {
    /// [batch, words, hidden] → GRU state after the last real word [batch, hidden]
    ///
    /// `lengths` [batch] counts the non-pad words of each question.
    pub fn forward(&self, question: Tensor<B, 3>, lengths: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch, _, hidden] = question.dims();
        let last = lengths
            .sub_scalar(1)
            .clamp_min(0)
            .reshape([batch, 1, 1])
            .expand([batch, 1, hidden]);

        self.gru
            .forward(question, None)
            .gather(1, last)
            .reshape([batch, hidden])
    }
}

// ─── Episodic memory ──────────────────────────────────────────────────────────
/// GRU whose update gate is replaced by an external attention weight.
#[derive(Module, Debug)]
pub struct AttentionGru<B: Backend> {
    pub wr: Linear<B>,
    pub ur: Linear<B>,
    pub w:  Linear<B>,
    pub u:  Linear<B>,
}

impl<B: Backend> AttentionGru<B> {
    /// facts [batch, sentences, hidden], gates [batch, sentences] → episode [batch, hidden]
    pub fn forward(&self, facts: Tensor<B, 3>, gates: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, sentences, hidden] = facts.dims();
        let mut state = Tensor::<B, 2>::zeros([batch, hidden], &facts.device());

        for s in 0..sentences {
            let fact = facts
                .clone()
                .slice([0..batch, s..s + 1, 0..hidden])
                .reshape([batch, hidden]);
            let gate = gates
                .clone()
                .slice([0..batch, s..s + 1])
                .expand([batch, hidden]);

            let reset     = activation::sigmoid(self.wr.forward(fact.clone()) + self.ur.forward(state.clone()));
            let candidate = (self.w.forward(fact) + reset * self.u.forward(state.clone())).tanh();

            state = gate.clone() * candidate + gate.neg().add_scalar(1.0) * state;
        }

        state
    }
}

#[derive(Module, Debug)]
pub struct EpisodicMemory<B: Backend> {
    pub attention_gru: AttentionGru<B>,
    pub z1:            Linear<B>,
    pub z2:            Linear<B>,
    pub next_memory:   Linear<B>,
}

impl<B: Backend> EpisodicMemory<B> {
    /// Attention weights over facts, softmax-normalised per sample: [batch, sentences]
    pub fn gates(&self, facts: Tensor<B, 3>, question: Tensor<B, 2>, memory: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, sentences, hidden] = facts.dims();
        let q = question.unsqueeze_dim::<3>(1).expand([batch, sentences, hidden]);
        let m = memory.unsqueeze_dim::<3>(1).expand([batch, sentences, hidden]);

        let interaction = Tensor::cat(
            vec![
                facts.clone() * q.clone(),
                facts.clone() * m.clone(),
                (facts.clone() - q).abs(),
                (facts - m).abs(),
            ],
            2,
        );

        let scores = self.z2.forward(self.z1.forward(interaction).tanh()); // [batch, sentences, 1]
        activation::softmax(scores.reshape([batch, sentences]), 1)
    }

    /// One memory pass: m → m'
    pub fn forward(&self, facts: Tensor<B, 3>, question: Tensor<B, 2>, memory: Tensor<B, 2>) -> Tensor<B, 2> {
        let gates   = self.gates(facts.clone(), question.clone(), memory.clone());
        let episode = self.attention_gru.forward(facts, gates);
        activation::relu(self.next_memory.forward(Tensor::cat(vec![memory, episode, question], 1)))
    }
}

// ─── Answer module ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct AnswerModule<B: Backend> {
    pub dropout: Dropout,
    pub z:       Linear<B>,
}

impl<B: Backend> AnswerModule<B> {
    /// [batch, hidden] × 2 → vocabulary logits [batch, vocab]
    pub fn forward(&self, memory: Tensor<B, 2>, question: Tensor<B, 2>) -> Tensor<B, 2> {
        let memory = self.dropout.forward(memory);
        self.z.forward(Tensor::cat(vec![memory, question], 1))
    }
}

/// 1 where the id is a real word, 0 where it is padding
fn non_pad<B: Backend, const D: usize>(ids: Tensor<B, D, Int>) -> Tensor<B, D, Int> {
    ids.equal_elem(PAD_ID as i32).bool_not().int()
}

// ─── Full model ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct DmnModel<B: Backend> {
    pub word_embedding:  Embedding<B>,
    pub input_module:    InputModule<B>,
    pub question_module: QuestionModule<B>,
    pub memory:          EpisodicMemory<B>,
    pub answer_module:   AnswerModule<B>,
    pub num_passes:      usize,
}

impl<B: Backend> DmnModel<B> {
    /// context [batch, sentences, words], questions [batch, words] → logits [batch, vocab]
    pub fn forward(&self, context: Tensor<B, 3, Int>, questions: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch, sentences, words] = context.dims();

        let embedded = self.embed(context.reshape([batch, sentences * words]));
        let [_, _, hidden] = embedded.dims();
        let facts = self
            .input_module
            .forward(embedded.reshape([batch, sentences, words, hidden]));

        let lengths  = non_pad(questions.clone()).sum_dim(1).reshape([batch]);
        let question = self.question_module.forward(self.embed(questions), lengths);

        let mut memory = question.clone();
        for _ in 0..self.num_passes {
            memory = self.memory.forward(facts.clone(), question.clone(), memory);
        }

        self.answer_module.forward(memory, question)
    }

    /// Word embeddings with every PAD_ID position zeroed: [batch, words, hidden]
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let mask     = non_pad(ids.clone()).float().unsqueeze_dim::<3>(2);
        let embedded = self.word_embedding.forward(ids);
        let dims     = embedded.dims();
        embedded * mask.expand(dims)
    }

    /// Cross-entropy loss and batch accuracy.
    pub fn loss(
        &self,
        context:   Tensor<B, 3, Int>,
        questions: Tensor<B, 2, Int>,
        answers:   Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, f64) {
        let logits = self.forward(context, questions);
        let [batch, _] = logits.dims();

        let ce   = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), answers.clone());

        // argmax(1) returns [batch, 1]: flatten before comparing with [batch]
        let correct: i64 = logits
            .argmax(1)
            .reshape([batch])
            .equal(answers)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        (loss, correct as f64 / batch.max(1) as f64)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{ndarray::NdArray, Autodiff};
    use burn::module::AutodiffModule;
    use burn::optim::{AdamConfig, GradientsParams, Optimizer};

    type TestBackend         = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    const VOCAB: usize = 12;

    fn inputs<B: Backend>(device: &B::Device) -> (Tensor<B, 3, Int>, Tensor<B, 2, Int>, Tensor<B, 1, Int>) {
        let context = Tensor::<B, 1, Int>::from_ints(
            [2, 3, 4, 0, 5, 6, 7, 8, 9, 0, 0, 0].as_slice(),
            device,
        )
        .reshape([2, 2, 3]);
        let questions = Tensor::<B, 1, Int>::from_ints([10, 11, 10, 0].as_slice(), device).reshape([2, 2]);
        let answers   = Tensor::<B, 1, Int>::from_ints([4, 7].as_slice(), device);
        (context, questions, answers)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: DmnModel<TestBackend> = DmnConfig::new(8, VOCAB).init(&device);
        let (context, questions, _) = inputs::<TestBackend>(&device);
        assert_eq!(model.forward(context, questions).dims(), [2, VOCAB]);
    }

    #[test]
    fn test_loss_is_finite_and_accuracy_bounded() {
        let device = Default::default();
        let model: DmnModel<TestBackend> = DmnConfig::new(8, VOCAB).init(&device);
        let (context, questions, answers) = inputs::<TestBackend>(&device);
        let (loss, acc) = model.loss(context, questions, answers);
        let loss: f64 = loss.into_scalar().elem();
        assert!(loss.is_finite());
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn test_gates_sum_to_one() {
        let device = Default::default();
        let model: DmnModel<TestBackend> = DmnConfig::new(8, VOCAB).init(&device);
        let facts    = Tensor::<TestBackend, 3>::ones([2, 4, 8], &device);
        let question = Tensor::<TestBackend, 2>::zeros([2, 8], &device);
        let gates    = model.memory.gates(facts, question.clone(), question);
        let sums: Vec<f32> = gates.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_position_encoding_values() {
        let device = Default::default();
        let enc: Vec<f32> = position_encoding::<TestBackend>(2, 2, &device).into_data().to_vec().unwrap();
        // j=1,d=1: 0.5 - 0.5*0 = 0.5 ; j=2,d=2: 0 - 1*(-1) = 1
        assert!((enc[0] - 0.5).abs() < 1e-6);
        assert!((enc[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pad_embeds_to_zero() {
        let device = Default::default();
        let model: DmnModel<TestBackend> = DmnConfig::new(8, VOCAB).init(&device);
        let ids = Tensor::<TestBackend, 1, Int>::from_ints([3, 0, 5].as_slice(), &device).reshape([1, 3]);

        let rows: Vec<f32> = model.embed(ids).into_data().to_vec().unwrap();
        assert!(rows[8..16].iter().all(|&v| v == 0.0));
        assert!(rows[..8].iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_trailing_question_padding_does_not_change_logits() {
        let device = Default::default();
        let model: DmnModel<TestBackend> = DmnConfig::new(8, VOCAB).init(&device);
        let (context, _, _) = inputs::<TestBackend>(&device);

        let short  = Tensor::<TestBackend, 1, Int>::from_ints([10, 11, 10, 0].as_slice(), &device).reshape([2, 2]);
        let padded = Tensor::<TestBackend, 1, Int>::from_ints([10, 11, 0, 0, 10, 0, 0, 0].as_slice(), &device)
            .reshape([2, 4]);

        let a: Vec<f32> = model.forward(context.clone(), short).into_data().to_vec().unwrap();
        let b: Vec<f32> = model.forward(context, padded).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5, "{x} vs {y}");
        }
    }

    #[test]
    fn test_eval_model_is_deterministic() {
        let device = Default::default();
        let model: DmnModel<TestAutodiffBackend> = DmnConfig::new(8, VOCAB).with_dropout(0.5).init(&device);
        let eval_model = model.valid();
        let (context, questions, _) = inputs::<TestBackend>(&device);
        let a: Vec<f32> = eval_model.forward(context.clone(), questions.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = eval_model.forward(context, questions).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_optimizer_step_changes_predictions() {
        let device = Default::default();
        let model: DmnModel<TestAutodiffBackend> = DmnConfig::new(8, VOCAB).with_dropout(0.0).init(&device);
        let mut optim = AdamConfig::new().init();
        let (context, questions, answers) = inputs::<TestAutodiffBackend>(&device);

        let before: Vec<f32> = model
            .forward(context.clone(), questions.clone())
            .into_data()
            .to_vec()
            .unwrap();

        let (loss, _) = model.loss(context.clone(), questions.clone(), answers);
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optim.step(1e-2, model, grads);

        let after: Vec<f32> = model.forward(context, questions).into_data().to_vec().unwrap();
        assert_ne!(before, after);
    }
}
