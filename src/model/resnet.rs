//! ResNet-50 Feature Extractor
//!
//! Bottleneck-based ResNet-50 ending in global average pooling. The final
//! classification layer is intentionally absent; the network produces a
//! 2048-dimensional feature vector consumed by the trainable head.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Dimension of the pooled feature vector
pub const FEATURE_DIM: usize = 2048;

/// Bottleneck channel expansion factor
const EXPANSION: usize = 4;

#[derive(Module, Debug)]
pub struct ResNet50<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    activation: Relu,
    maxpool: MaxPool2d,

    layer1: ResNetLayer<B>,
    layer2: ResNetLayer<B>,
    layer3: ResNetLayer<B>,
    layer4: ResNetLayer<B>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet50<B> {
    /// Extract pooled features with shape [batch_size, 2048]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        let x = self.avgpool.forward(x);
        x.flatten(1, 3)
    }
}

#[derive(Config, Debug)]
pub struct ResNet50Config {
    #[config(default = 3)]
    input_channels: usize,
}

impl ResNet50Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet50<B> {
        ResNet50 {
            conv1: Conv2dConfig::new([self.input_channels, 64], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .with_initializer(Initializer::KaimingNormal {
                    gain: (2.0_f64).sqrt(),
                    fan_out_only: true,
                })
                .init(device),
            bn1: BatchNormConfig::new(64).init(device),
            activation: Relu::new(),
            maxpool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),

            layer1: ResNetLayerConfig::new(64, 64, 3, [1, 1]).init(device),
            layer2: ResNetLayerConfig::new(256, 128, 4, [2, 2]).init(device),
            layer3: ResNetLayerConfig::new(512, 256, 6, [2, 2]).init(device),
            layer4: ResNetLayerConfig::new(1024, 512, 3, [2, 2]).init(device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

#[derive(Module, Debug)]
struct ResNetLayer<B: Backend> {
    blocks: Vec<Bottleneck<B>>,
}

impl<B: Backend> ResNetLayer<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(x, |x, block| block.forward(x))
    }
}

#[derive(Config, Debug)]
struct ResNetLayerConfig {
    in_planes: usize,
    planes: usize,
    blocks: usize,
    stride: [usize; 2],
}

impl ResNetLayerConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> ResNetLayer<B> {
        let out_planes = self.planes * EXPANSION;

        let downsample = if self.stride != [1, 1] || self.in_planes != out_planes {
            Some(DownSampleConfig::new(self.in_planes, out_planes, self.stride))
        } else {
            None
        };

        let mut blocks = Vec::with_capacity(self.blocks);
        blocks.push(
            BottleneckConfig::new(self.in_planes, self.planes)
                .with_stride(self.stride)
                .with_downsample(downsample)
                .init(device),
        );
        for _ in 1..self.blocks {
            blocks.push(BottleneckConfig::new(out_planes, self.planes).init(device));
        }

        ResNetLayer { blocks }
    }
}

#[derive(Module, Debug)]
struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    shortcut: Option<DownSample<B>>,
    activation: Relu,
}

impl<B: Backend> Bottleneck<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = x.clone();
        let shortcut = match &self.shortcut {
            Some(shortcut) => shortcut.forward(identity),
            None => identity,
        };

        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);

        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.activation.forward(x);

        let x = self.conv3.forward(x);
        let x = self.bn3.forward(x);

        self.activation.forward(x + shortcut)
    }
}

#[derive(Config, Debug)]
struct BottleneckConfig {
    /// Input channels
    in_planes: usize,
    /// Internal (bottleneck) channels; output is planes * 4
    planes: usize,
    /// Stride of the 3x3 convolution
    #[config(default = "[1, 1]")]
    stride: [usize; 2],
    #[config(default = "None")]
    downsample: Option<DownSampleConfig>,
}

impl BottleneckConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> Bottleneck<B> {
        let out_planes = self.planes * EXPANSION;

        Bottleneck {
            conv1: Conv2dConfig::new([self.in_planes, self.planes], [1, 1])
                .with_bias(false)
                .init(device),
            bn1: BatchNormConfig::new(self.planes).init(device),
            conv2: Conv2dConfig::new([self.planes, self.planes], [3, 3])
                .with_stride(self.stride)
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn2: BatchNormConfig::new(self.planes).init(device),
            conv3: Conv2dConfig::new([self.planes, out_planes], [1, 1])
                .with_bias(false)
                .init(device),
            bn3: BatchNormConfig::new(out_planes).init(device),
            shortcut: self.downsample.as_ref().map(|ds| ds.init(device)),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
struct DownSample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> DownSample<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        self.bn.forward(x)
    }
}

#[derive(Config, Debug)]
struct DownSampleConfig {
    in_planes: usize,
    out_planes: usize,
    stride: [usize; 2],
}

impl DownSampleConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> DownSample<B> {
        DownSample {
            conv: Conv2dConfig::new([self.in_planes, self.out_planes], [1, 1])
                .with_stride(self.stride)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(self.out_planes).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_feature_shape() {
        let device = Default::default();
        let model = ResNet50Config::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let features = model.forward(input);

        assert_eq!(features.dims(), [2, FEATURE_DIM]);
    }

    #[test]
    fn test_parameter_count() {
        let device = Default::default();
        let model = ResNet50Config::new().init::<TestBackend>(&device);

        // Conv + batch-norm parameters of a standard ResNet-50 without the
        // final dense layer land around 23.5M
        let n = model.num_params();
        assert!(n > 23_000_000, "got {} params", n);
        assert!(n < 24_200_000, "got {} params", n);
    }
}
