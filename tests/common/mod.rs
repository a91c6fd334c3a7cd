//! Shared fixtures for integration tests

#![allow(dead_code)]

use cloudres::client::StubClient;
use cloudres::resource::{Model, Service};
use serde_json::{json, Value};
use std::sync::Arc;

/// A small storage / queue / compute service definition
pub fn document() -> Value {
    json!({
        "service": {
            "actions": {
                "CreateBucket": {
                    "request": {
                        "operation": "CreateBucket",
                        "params": [{"target": "Bucket", "source": "argument"}]
                    },
                    "resource": {
                        "type": "Bucket",
                        "identifiers": [
                            {"target": "Name", "source": "requestParameter", "path": "Bucket"}
                        ]
                    }
                }
            },
            "has": {
                "Bucket": {
                    "resource": {
                        "type": "Bucket",
                        "identifiers": [{"target": "Name", "source": "argument"}]
                    }
                }
            },
            "hasMany": {
                "Buckets": {
                    "request": {"operation": "ListBuckets"},
                    "resource": {
                        "type": "Bucket",
                        "identifiers": [
                            {"target": "Name", "source": "response", "path": "Buckets[].Name"}
                        ],
                        "path": "Buckets[]"
                    }
                }
            }
        },
        "shapes": {
            "BucketShape": {"members": {"Name": "string", "CreationDate": "timestamp", "LocationConstraint": "string"}},
            "ObjectShape": {"members": {"Key": "string", "Size": "long", "LastModified": "timestamp"}},
            "MessageShape": {"members": {"Body": "string", "ReceiptHandle": "string"}},
            "InstanceShape": {"members": {"InstanceId": "string", "State": "structure", "BlockDeviceMappings": "list"}}
        },
        "resources": {
            "Bucket": {
                "identifiers": ["Name"],
                "shape": "BucketShape",
                "load": {
                    "request": {
                        "operation": "GetBucketLocation",
                        "params": [{"target": "Bucket", "source": "identifier", "name": "Name"}]
                    },
                    "path": "$"
                },
                "actions": {
                    "Delete": {
                        "request": {
                            "operation": "DeleteBucket",
                            "params": [{"target": "Bucket", "source": "identifier", "name": "Name"}]
                        }
                    }
                },
                "has": {
                    "Object": {
                        "resource": {
                            "type": "Object",
                            "identifiers": [
                                {"target": "BucketName", "source": "identifier", "name": "Name"},
                                {"target": "Key", "source": "argument"}
                            ]
                        }
                    }
                },
                "hasMany": {
                    "Objects": {
                        "request": {
                            "operation": "ListObjects",
                            "params": [{"target": "Bucket", "source": "identifier", "name": "Name"}]
                        },
                        "resource": {
                            "type": "Object",
                            "identifiers": [
                                {"target": "BucketName", "source": "identifier", "name": "Name"},
                                {"target": "Key", "source": "response", "path": "Contents[].Key"}
                            ],
                            "path": "Contents[]"
                        },
                        "paginate": {"inputToken": "Marker", "outputToken": "NextMarker"}
                    }
                },
                "waiters": {
                    "Exists": {
                        "request": {
                            "operation": "HeadBucket",
                            "params": [{"target": "Bucket", "source": "identifier", "name": "Name"}]
                        },
                        "acceptors": [
                            {"matcher": "error", "expected": "NotFound", "state": "retry"},
                            {"matcher": "path", "path": "$", "expected": {}, "state": "success"}
                        ],
                        "maxAttempts": 5,
                        "delay": 0
                    }
                }
            },
            "Object": {
                "identifiers": ["BucketName", "Key"],
                "shape": "ObjectShape",
                "load": {
                    "request": {
                        "operation": "HeadObject",
                        "params": [
                            {"target": "Bucket", "source": "identifier", "name": "BucketName"},
                            {"target": "Key", "source": "identifier", "name": "Key"}
                        ]
                    },
                    "path": "$"
                },
                "has": {
                    "Bucket": {
                        "resource": {
                            "type": "Bucket",
                            "identifiers": [{"target": "Name", "source": "identifier", "name": "BucketName"}]
                        }
                    }
                },
                "batchActions": {
                    "Delete": {
                        "request": {
                            "operation": "DeleteObjects",
                            "params": [
                                {"target": "Bucket", "source": "identifier", "name": "BucketName"},
                                {"target": "Delete.Objects.*.Key", "source": "identifier", "name": "Key"}
                            ]
                        },
                        "path": "Deleted"
                    }
                }
            },
            "Queue": {
                "identifiers": ["Url"],
                "has": {
                    "Message": {
                        "resource": {
                            "type": "Message",
                            "identifiers": [
                                {"target": "QueueUrl", "source": "identifier", "name": "Url"},
                                {"target": "ReceiptHandle", "source": "argument"}
                            ]
                        }
                    }
                },
                "actions": {
                    "ReceiveMessages": {
                        "request": {
                            "operation": "ReceiveMessage",
                            "params": [{"target": "QueueUrl", "source": "identifier", "name": "Url"}]
                        },
                        "resource": {
                            "type": "Message",
                            "identifiers": [
                                {"target": "QueueUrl", "source": "identifier", "name": "Url"},
                                {"target": "ReceiptHandle", "source": "response", "path": "Messages[].ReceiptHandle"}
                            ],
                            "path": "Messages[]"
                        }
                    },
                    "SendMessage": {
                        "request": {
                            "operation": "SendMessage",
                            "params": [
                                {"target": "QueueUrl", "source": "identifier", "name": "Url"},
                                {"target": "MessageBody", "source": "argument", "name": "Body"}
                            ]
                        },
                        "path": "MessageId"
                    }
                }
            },
            "Message": {
                "identifiers": ["QueueUrl", "ReceiptHandle"],
                "shape": "MessageShape"
            },
            "Instance": {
                "identifiers": ["Id"],
                "shape": "InstanceShape",
                "load": {
                    "request": {
                        "operation": "DescribeInstances",
                        "params": [{"target": "InstanceIds.0", "source": "identifier", "name": "Id"}]
                    },
                    "path": "Reservations.0.Instances.0"
                },
                "actions": {
                    "Stop": {
                        "request": {
                            "operation": "StopInstances",
                            "params": [{"target": "InstanceIds.0", "source": "identifier", "name": "Id"}]
                        },
                        "refresh": "StoppingInstances.0"
                    }
                },
                "has": {
                    "Volumes": {
                        "plural": true,
                        "resource": {
                            "type": "Volume",
                            "identifiers": [
                                {"target": "Id", "source": "data", "path": "BlockDeviceMappings[].Ebs.VolumeId"}
                            ]
                        }
                    }
                },
                "waiters": {
                    "Running": {
                        "request": {
                            "operation": "DescribeInstances",
                            "params": [{"target": "InstanceIds.0", "source": "identifier", "name": "Id"}]
                        },
                        "acceptors": [
                            {"path": "Reservations.0.Instances.0.State.Name", "expected": "running", "state": "success"},
                            {"matcher": "pathAny", "path": "Reservations[].Instances[].State.Name", "expected": "terminated", "state": "failure"}
                        ],
                        "maxAttempts": 3,
                        "delay": 0
                    }
                }
            },
            "Volume": {
                "identifiers": ["Id"]
            }
        }
    })
}

pub fn model() -> Model {
    Model::from_value("cloud", document()).expect("fixture document loads")
}

pub fn service() -> (Service, Arc<StubClient>) {
    let stub = Arc::new(StubClient::new());
    (Service::new(model(), stub.clone()), stub)
}

/// `DescribeInstances` response for one instance in `state`
pub fn instance_state(id: &str, state: &str) -> Value {
    json!({
        "Reservations": [{
            "Instances": [{
                "InstanceId": id,
                "State": {"Name": state}
            }]
        }]
    })
}
